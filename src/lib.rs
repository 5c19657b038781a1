//! Personalized multimodal assistant with double memory.
//!
//! Tame remembers the people, pets and objects ("concepts") a user talks about. Each concept
//! keeps two tiers of free-text memory, updated by a vision-language model after every turn
//! of conversation:
//!
//! | Tier | Holds | Bound |
//! |------|-------|-------|
//! | **Static** | Permanent facts: names, species, appearance, preferences | Unbounded |
//! | **Dynamic** | Recent observations and current state | Last 10 entries (FIFO) |
//!
//! Facts the model judges permanent are promoted from dynamic to static memory. When a new
//! image arrives, the concept in it is identified by weighted image and text similarity
//! against every concept's portrait and visual facts, and its memory becomes the context for
//! answering questions.
//!
//! # Architecture
//!
//! - **Storage**: one directory per concept holding `static.yaml`, `dynamic.yaml` and
//!   `portrait.png`, namespaced by model
//! - **Embeddings**: local ONNX Runtime with CLIP ViT-B/32 (512 dimensions) for images and text
//! - **Detection**: pluggable open-vocabulary detector with label-priority suppression
//! - **Model**: any OpenAI-compatible chat endpoint serving a vision-language model
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`memory`]: Memory store, operation parser, concept directory and statistics
//! - [`llm`]: Model collaborator trait, OpenAI-compatible client and retries
//! - [`vision`]: Detector trait, region selection and cropping
//! - [`embedding`]: Image and text embedding via ONNX Runtime
//! - [`identify`]: Concept identification by weighted retrieval
//! - [`assistant`]: Turn orchestration, context building and question answering
//! - [`dataset`] / [`results`]: Dataset files and the resumable results log

pub mod assistant;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod identify;
pub mod llm;
pub mod memory;
pub mod results;
pub mod vision;
