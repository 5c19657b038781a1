//! Instruction templates sent to the model.
//!
//! Memory-editing prompts ask for a fenced YAML block of operations with 1-indexed
//! `target_id`s matching the numbered lists shown to the model.

/// `1. first\n2. second`; empty for an empty list.
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Ask for edits to dynamic memory given one conversation turn.
pub fn dynamic_update(
    concept_id: &str,
    dynamic_memory: &[String],
    question: &str,
    answer: &str,
    has_image: bool,
) -> String {
    format!(
        r#"You maintain the Dynamic Memory (a short-term buffer) for `{concept_id}`.
Update it from the conversation below.

## RULES
- New facts, preferences or current status: ADD them.
- Corrections to an existing entry: MODIFY that entry by its number.
- Entries the conversation shows to be wrong or obsolete: REMOVE them by number.
- Greetings, thanks and other chit-chat: output [].
- Never add something already in the list. Keep each entry under 25 words.
- Refer to the concept as "{concept_id}", not "it" or "he/she".
- Put the word "visual" in any entry about appearance.

## EXISTING DYNAMIC MEMORY
```yaml
{memory}
```

## CURRENT CONVERSATION
- User: "{question}"
- Assistant: "{answer}"
- Image attached: {image}

## OUTPUT
Write a short `# Analysis` comment, then one YAML code block:

```yaml
- op: "add"        # "add", "modify" or "remove"
  memory: "Luna is limping today."
  target_id: 1     # only for "modify" and "remove"
```

Output [] inside the block when nothing should change."#,
        memory = numbered_list(dynamic_memory),
        image = yes_no(has_image),
    )
}

/// Ask which dynamic entries are permanent facts to move into static memory.
pub fn promotion(concept_id: &str, dynamic_memory: &[String], static_memory: &[String]) -> String {
    format!(
        r#"You curate long-term memory for `{concept_id}`. Move PERMANENT FACTS from Dynamic
Memory to Static Memory and leave TEMPORARY EVENTS where they are.

## DYNAMIC MEMORY (recent observations)
```yaml
{dynamic}
```

## STATIC MEMORY (long-term facts)
```yaml
{static_}
```

## CLASSIFICATION
- Permanent: names, species, breed, personality, physical features, favourite things,
  relationships. Add it to static memory AND remove it from dynamic memory. Put the word
  "visual" in any fact about appearance.
- Temporary: what is happening now or recently (eating, sleeping, moods, single events).
  Produce no operation for these.
- Do not add a fact static memory already holds.

## OUTPUT
Write a short `# Analysis` comment, then one YAML code block with two lists. `target_id`
values refer to the numbers above.

```yaml
dynamic_ops:
- op: "remove"
  target_id: 2
static_ops:
- op: "add"
  memory: "Luna is a cat."
```

When nothing is permanent, output:

```yaml
dynamic_ops: []
static_ops: []
```"#,
        dynamic = numbered_list(dynamic_memory),
        static_ = numbered_list(static_memory),
    )
}

/// Ask for only the memory items that bear on `question`.
pub fn alignment(context: &str, question: &str, has_image: bool) -> String {
    format!(
        r#"# TASK: MEMORY EXTRACTION
List the memories from MEMORY CONTENT that are relevant to the USER QUESTION.

# CONSTRAINTS
- A plain bulleted list, nothing else.
- Do not answer the question.
- Only use memories present in MEMORY CONTENT, keeping their details (names, dates,
  colours, quantities).

# INPUT
- USER QUESTION: "{question}"
- IMAGE ATTACHED: {image}
- MEMORY CONTENT:
---
{context}
---

# EXTRACTED MEMORIES:
"#,
        image = yes_no(has_image),
    )
}

/// Free-text answer in a single paragraph.
pub fn answer(context: &str, question: &str, has_image: bool) -> String {
    format!(
        r#"# TASK: PERSONALIZED ANSWER
Answer a question about a specific concept using what is remembered about it: its
permanent traits (static memory) and its current state (dynamic memory).

# CONCEPT CONTEXT
{context}

# QUESTION
"{question}"
Image provided: {image}

# REQUIREMENTS
- Combine permanent traits with recent state. When they disagree, say so
  (for example "usually X, but currently Y").
- Use only the context above; say plainly when the answer is unknown.
- If an image is provided, tie what it shows to the remembered features.
- Write exactly one concise paragraph.

# RESPONSE:"#,
        image = yes_no(has_image),
    )
}

/// Multiple-choice answer; `options` must already hold exactly four entries.
pub fn choice(context: &str, question: &str, options: &[String], has_image: bool) -> String {
    let formatted = options
        .iter()
        .zip(['A', 'B', 'C', 'D'])
        .map(|(option, letter)| format!("{letter}. {option}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"You are a personalized assistant with remembered knowledge about a concept.

# CONCEPT INFORMATION
{context}

# QUESTION
"{question}"
Image provided: {image}

Options:
{formatted}

Pick the option that best fits both the concept's permanent traits and its recent state.
Reply with ONLY the letter (A, B, C or D)."#,
        image = yes_no(has_image),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_list_is_one_indexed() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(numbered_list(&items), "1. a\n2. b");
        assert_eq!(numbered_list(&[]), "");
    }

    #[test]
    fn dynamic_prompt_carries_turn_and_snapshot() {
        let prompt = dynamic_update(
            "luna",
            &["Luna is sleeping".to_string()],
            "Where is Luna?",
            "On the sofa.",
            true,
        );
        assert!(prompt.contains("`luna`"));
        assert!(prompt.contains("1. Luna is sleeping"));
        assert!(prompt.contains("User: \"Where is Luna?\""));
        assert!(prompt.contains("Image attached: Yes"));
    }

    #[test]
    fn promotion_prompt_lists_both_tiers() {
        let prompt = promotion(
            "luna",
            &["Luna is a cat".to_string()],
            &["Luna has visual white fur".to_string()],
        );
        assert!(prompt.contains("1. Luna is a cat"));
        assert!(prompt.contains("1. Luna has visual white fur"));
        assert!(prompt.contains("dynamic_ops"));
        assert!(prompt.contains("static_ops"));
    }

    #[test]
    fn choice_prompt_letters_options() {
        let options: Vec<String> = ["red", "blue", "green", "black"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let prompt = choice("ctx", "What colour?", &options, false);
        assert!(prompt.contains("A. red\nB. blue\nC. green\nD. black"));
        assert!(prompt.contains("Image provided: No"));
    }
}
