mod helpers;

use helpers::{assistant, seed, solid, ScriptedModel, GREEN, RED};
use tame::assistant::answer::{
    GENERATION_FAILED, IMAGE_UNREADABLE, INVALID_PARAMETERS, NOT_IDENTIFIED, WRONG_OPTION_COUNT,
};
use tame::assistant::build_context;
use tame::memory::types::MemoryKind;
use tempfile::TempDir;

fn options() -> Vec<String> {
    ["Salmon", "Tuna", "Chicken", "Nothing"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[test]
fn full_workflow_identifies_aligns_answers_and_chooses() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::new(vec![
        "- Luna ate tuna this morning".to_string(),
        "Luna had tuna this morning.".to_string(),
        "b) Tuna".to_string(),
    ]);
    let a = assistant(tmp.path(), model.clone());
    seed(&a, "luna", MemoryKind::Static, &["Luna is a tabby cat", "Luna has visual red fur"])
        .save_portrait(&solid(4, 4, RED));
    seed(&a, "luna", MemoryKind::Dynamic, &["Luna ate tuna this morning"]);
    seed(&a, "rex", MemoryKind::Static, &["Rex is a dog"]).save_portrait(&solid(4, 4, GREEN));
    a.refresh_concepts();

    let query = tmp.path().join("query.png");
    solid(12, 12, RED).save(&query).unwrap();

    let outcome = a.complete_qa_workflow(&query, "What did Luna eat?", Some(options().as_slice()));

    assert_eq!(outcome.concept_id.as_deref(), Some("luna"));
    assert_eq!(outcome.answer, "Luna had tuna this morning.");
    assert_eq!(outcome.choice.as_deref(), Some("B"));

    let calls = model.calls();
    assert_eq!(calls.len(), 3, "alignment, answer and choice calls");
    assert!(calls.iter().all(|c| c.with_image));
    assert!(calls[0].prompt.contains("Luna is a tabby cat"), "alignment sees full memory");
    assert!(
        calls[1].prompt.contains("- Luna ate tuna this morning"),
        "answer uses the aligned context"
    );
    assert!(calls[2].prompt.contains("B. Tuna"));
}

#[test]
fn workflow_without_four_options_skips_the_choice() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::new(vec!["ctx".to_string(), "answer".to_string()]);
    let a = assistant(tmp.path(), model.clone());
    seed(&a, "luna", MemoryKind::Static, &["Luna is a cat"]).save_portrait(&solid(4, 4, RED));
    a.refresh_concepts();
    let query = tmp.path().join("query.png");
    solid(8, 8, RED).save(&query).unwrap();

    let options = options();
    let outcome = a.complete_qa_workflow(&query, "Who is this?", Some(&options[..3]));

    assert_eq!(outcome.answer, "answer");
    assert_eq!(outcome.choice, None);
    assert_eq!(model.calls().len(), 2);
}

#[test]
fn workflow_reports_unusable_inputs() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::silent();
    let a = assistant(tmp.path(), model.clone());
    let query = tmp.path().join("query.png");
    solid(8, 8, RED).save(&query).unwrap();

    let outcome = a.complete_qa_workflow(&query, "", None);
    assert_eq!(outcome.answer, INVALID_PARAMETERS);

    let outcome = a.complete_qa_workflow(&tmp.path().join("missing.png"), "Who?", None);
    assert_eq!(outcome.answer, IMAGE_UNREADABLE);
    assert_eq!(outcome.concept_id, None);

    let outcome = a.complete_qa_workflow(&query, "Who?", None);
    assert_eq!(outcome.answer, NOT_IDENTIFIED, "no concepts are known yet");

    assert!(model.calls().is_empty());
}

#[test]
fn choice_question_requires_exactly_four_options() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::silent();
    let a = assistant(tmp.path(), model.clone());

    let answer = a.answer_choice_question("luna", "What?", &options()[..3], "ctx", None);
    assert_eq!(answer, WRONG_OPTION_COUNT);
    let answer = a.answer_choice_question("luna", "What?", &[], "ctx", None);
    assert_eq!(answer, INVALID_PARAMETERS);
    assert!(model.calls().is_empty());
}

#[test]
fn choice_without_a_letter_defaults_to_a() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::new(vec!["I'm not sure.".to_string()]);
    let a = assistant(tmp.path(), model);

    let answer = a.answer_choice_question("luna", "What?", &options(), "ctx", None);
    assert_eq!(answer, "A");
}

#[test]
fn failed_answer_generation_returns_error_text() {
    let tmp = TempDir::new().unwrap();
    let a = assistant(tmp.path(), ScriptedModel::failing(1));

    let answer = a.answer_question("luna", "What?", "ctx", None);
    assert_eq!(answer, GENERATION_FAILED);
}

#[test]
fn context_without_question_is_the_rendered_memory() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::silent();
    let a = assistant(tmp.path(), model.clone());
    seed(&a, "luna", MemoryKind::Static, &["Luna is a cat"]);

    let context = a.get_context("luna", None, None);

    assert_eq!(
        context,
        build_context("luna", &["Luna is a cat".to_string()], &[])
    );
    assert!(context.ends_with("## DYNAMIC MEMORY\nNo recent contextual information available."));
    assert!(model.calls().is_empty());
}

#[test]
fn context_alignment_failure_falls_back_to_full_context() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::failing(1);
    let a = assistant(tmp.path(), model.clone());
    seed(&a, "luna", MemoryKind::Dynamic, &["Luna is hungry"]);

    let context = a.get_context("luna", Some("Is Luna hungry?"), None);

    assert_eq!(context, "Concept ID: luna\n\n\n## DYNAMIC MEMORY\n- Luna is hungry");
    assert_eq!(model.calls().len(), 1);
}

#[test]
fn unknown_concept_context_is_empty_memory() {
    let tmp = TempDir::new().unwrap();
    let a = assistant(tmp.path(), ScriptedModel::silent());

    assert_eq!(
        a.get_context("ghost", None, None),
        "Concept ID: ghost\n\n\n## DYNAMIC MEMORY\nNo recent contextual information available."
    );
}
