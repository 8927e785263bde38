//! Study Pipeline
//!
//! Document-level operations built on the dispatcher: study cards from text
//! chunks (optionally grounded by the vector store), questions answered over
//! the stored passages, chapter and document summaries, table-of-contents
//! analysis and file ordering.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatcher::{GenerationDispatcher, GenerationRequest};
use crate::error::LlmError;
use crate::normalize::{OutputNormalizer, strip_code_fences};
use crate::records::{Card, dedupe_cards, parse_cards};
use crate::store::VectorStore;
use crate::types::SamplingParams;

/// Longest input forwarded to summary and TOC prompts, in characters.
pub const MAX_PROMPT_INPUT_CHARS: usize = 30_000;

const GROUNDING_PASSAGES: usize = 3;
const ANSWER_PASSAGES: usize = 5;

/// Models used by each pipeline operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineModels {
    pub cards: String,
    pub toc: String,
    pub sorting: String,
    pub summary: String,
    pub chat: String,
}

impl Default for PipelineModels {
    fn default() -> Self {
        Self {
            cards: "gemini-3-flash".to_string(),
            toc: "gemini-2.5-flash-lite".to_string(),
            sorting: "gemma-3-27b-it".to_string(),
            summary: "gemma-3-27b-it".to_string(),
            chat: "gemini-3-flash".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardLength {
    Short,
    #[default]
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardDensity {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardOptions {
    pub length: CardLength,
    pub density: CardDensity,
    /// Bold the high-yield keywords of each answer.
    pub highlight: bool,
    pub custom_instruction: Option<String>,
}

impl CardOptions {
    pub const fn with_length(mut self, length: CardLength) -> Self {
        self.length = length;
        self
    }

    pub const fn with_density(mut self, density: CardDensity) -> Self {
        self.density = density;
        self
    }

    pub const fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn with_custom_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.custom_instruction = Some(instruction.into());
        self
    }

    fn system_instruction(&self) -> String {
        let length = match self.length {
            CardLength::Short => "Answers MUST be extremely concise (1-5 words maximum). Fast recall.",
            CardLength::Medium => "Answers should be standard flashcard length (1-2 sentences).",
            CardLength::Long => {
                "Answers should be detailed and conceptual (3-5 sentences), explaining the mechanism and context."
            }
        };
        let density = match self.density {
            CardDensity::Low => {
                "DENSITY = LOW. Generate cards ONLY for the most critical, high-yield concepts. Skip minor details."
            }
            CardDensity::Normal => {
                "DENSITY = NORMAL. Generate a balanced set of cards covering main points and important details."
            }
            CardDensity::High => {
                "DENSITY = HIGH. Generate comprehensive cards covering every detail, mechanism and fact in the text."
            }
        };

        let mut rules = vec![
            "Formatting: Use Markdown with KaTeX for math ($...$ inline, $$...$$ for blocks).".to_string(),
            "Structure: \"Front\"|\"Back\" with a pipe | as the delimiter. Enclose EVERY field in double quotes. \
             Escape a double quote inside a field by doubling it (\" -> \"\")."
                .to_string(),
            "Completeness: EVERY card MUST have a question AND an answer. Do not generate headers.".to_string(),
            "Strictness: Output ONLY the card lines. No code fences. One card per line.".to_string(),
            length.to_string(),
            density.to_string(),
        ];
        if self.highlight {
            rules.push(
                "Use bold (**text**) to highlight the most high-yield keywords in the answer.".to_string(),
            );
        }
        if let Some(custom) = self.custom_instruction.as_deref().filter(|c| !c.trim().is_empty()) {
            rules.push(format!("USER OVERRIDE/ADDITION: {custom}"));
        }

        let numbered: Vec<String> = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| format!("{}. {rule}", i + 1))
            .collect();
        format!(
            "You are an expert flashcard generator for medical students.\n\nRules:\n{}",
            numbered.join("\n")
        )
    }
}

/// Cards generated for one chunk of a batch.
#[derive(Debug, Clone)]
pub struct ChunkCards {
    pub index: usize,
    pub result: Result<Vec<Card>, LlmError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One earlier message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Chapter entry extracted from a table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub page: u32,
}

pub struct StudyPipeline {
    dispatcher: Arc<GenerationDispatcher>,
    store: Option<Arc<VectorStore>>,
    normalizer: OutputNormalizer,
    models: PipelineModels,
}

impl StudyPipeline {
    pub fn new(dispatcher: Arc<GenerationDispatcher>) -> Self {
        Self {
            dispatcher,
            store: None,
            normalizer: OutputNormalizer::default(),
            models: PipelineModels::default(),
        }
    }

    /// Ground card generation on passages retrieved from `store`.
    pub fn with_store(mut self, store: Arc<VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_models(mut self, models: PipelineModels) -> Self {
        self.models = models;
        self
    }

    pub fn with_normalizer(mut self, normalizer: OutputNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn models(&self) -> &PipelineModels {
        &self.models
    }

    /// Generate cards for one chunk. The card model is never substituted.
    pub async fn generate_cards(&self, chunk: &str, options: &CardOptions) -> Result<Vec<Card>, LlmError> {
        let content = match self.grounding_for(chunk).await {
            Some(context) => format!("Reference context:\n{context}\n\nText:\n{chunk}"),
            None => chunk.to_string(),
        };
        let request = GenerationRequest::new(&self.models.cards, content)
            .with_system_instruction(options.system_instruction())
            .with_sampling(
                SamplingParams::new()
                    .with_temperature(0.2)
                    .with_max_output_tokens(65_536),
            );

        let generation = self.dispatcher.generate(&request).await?;
        let cards = parse_cards(&self.normalizer.normalize(&generation.text));
        debug!(model = %generation.model, cards = cards.len(), "cards generated");
        Ok(cards)
    }

    /// Generate cards for every chunk, dropping questions already produced
    /// for an earlier chunk. A failing chunk does not stop the others.
    pub async fn generate_cards_for_chunks<S: AsRef<str>>(
        &self,
        chunks: &[S],
        options: &CardOptions,
    ) -> Vec<ChunkCards> {
        let mut seen_questions: Vec<String> = Vec::new();
        let mut results = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let result = match self.generate_cards(chunk.as_ref(), options).await {
                Ok(cards) => {
                    let cards = dedupe_cards(cards, &seen_questions);
                    seen_questions.extend(cards.iter().map(|c| c.front.clone()));
                    Ok(cards)
                }
                Err(error) => {
                    warn!(chunk = index, error = %error, "card generation failed for chunk");
                    Err(error)
                }
            };
            results.push(ChunkCards { index, result });
        }
        results
    }

    /// Answer `question` from the passages most similar to it.
    ///
    /// Without a store, or when retrieval yields nothing, the question is
    /// sent without context. `history` is replayed before the question.
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<String, LlmError> {
        let mut content = String::new();
        match self.passages_for(question, ANSWER_PASSAGES).await {
            Some(passages) => {
                content.push_str("Context from the documents:\n");
                content.push_str(&passages.join("\n\n"));
                content.push_str("\n\n");
            }
            None => debug!("answering without document context"),
        }
        if !history.is_empty() {
            content.push_str("Conversation so far:\n");
            for turn in history {
                let speaker = match turn.role {
                    ChatRole::User => "User",
                    ChatRole::Assistant => "Assistant",
                };
                content.push_str(&format!("{speaker}: {}\n", turn.content));
            }
            content.push('\n');
        }
        content.push_str(&format!("Question:\n{question}"));

        let request = GenerationRequest::new(&self.models.chat, content)
            .with_system_instruction(
                "You are a helpful tutor for medical students. Answer using the provided context \
                 when it is relevant. If the context does not contain the answer, say so and answer \
                 from general knowledge.",
            )
            .with_sampling(SamplingParams::new().with_temperature(0.3))
            .with_model_fallback(true);
        Ok(self.dispatcher.generate(&request).await?.text)
    }

    /// Three to five sentence summary of a chapter.
    pub async fn summarize_chapter(&self, text: &str) -> Result<String, LlmError> {
        let content = format!(
            "Summarize the following medical text in 3-5 concise sentences. \
             Focus on high-yield pathologies and mechanisms.\n\nText:\n{}",
            truncate_chars(text, MAX_PROMPT_INPUT_CHARS)
        );
        let request = GenerationRequest::new(&self.models.summary, content)
            .with_sampling(SamplingParams::new().with_temperature(0.2))
            .with_model_fallback(true);
        Ok(self.dispatcher.generate(&request).await?.text)
    }

    /// Abstract of a whole document from its chapter summaries.
    pub async fn summarize_document<S: AsRef<str>>(&self, summaries: &[S]) -> Result<String, LlmError> {
        let bullets: Vec<&str> = summaries.iter().map(AsRef::as_ref).collect();
        let content = format!(
            "Create a coherent summary/abstract of the entire document based on these chapter summaries:\n\n- {}",
            bullets.join("\n- ")
        );
        let request = GenerationRequest::new(&self.models.summary, content)
            .with_sampling(SamplingParams::new().with_temperature(0.2))
            .with_model_fallback(true);
        Ok(self.dispatcher.generate(&request).await?.text)
    }

    /// Extract the chapters listed in a table of contents.
    pub async fn analyze_toc(&self, toc_text: &str) -> Result<Vec<TocEntry>, LlmError> {
        let content = format!(
            "You are a PDF structure analyzer. Analyze the following text, which contains the table of \
             contents of a textbook, and extract the hierarchical chapters.\n\n\
             Output strictly valid JSON: a list of objects \
             [{{\"title\": \"Chapter Title\", \"page\": <integer page number>}}, ...]\n\n\
             Rules:\n\
             1. Ignore preface, foreword and other front matter. Start with Chapter 1 if possible.\n\
             2. Extract the main chapters or units.\n\
             3. 'page' must be the integer page number found in the text.\n\n\
             Text:\n{}",
            truncate_chars(toc_text, MAX_PROMPT_INPUT_CHARS)
        );
        let request = GenerationRequest::new(&self.models.toc, content)
            .with_sampling(SamplingParams::new().with_temperature(0.1).with_json_output());

        let generation = self.dispatcher.generate(&request).await?;
        let entries: Vec<TocEntry> = serde_json::from_str(&strip_code_fences(&generation.text))?;
        Ok(entries)
    }

    /// Order file names the way a reader would (Lecture 2 before Lecture 10).
    ///
    /// Returns `names` unchanged when the model fails or answers with a list
    /// of a different length.
    pub async fn sort_file_names(&self, names: &[String]) -> Vec<String> {
        if names.len() < 2 {
            return names.to_vec();
        }
        match self.try_sort_file_names(names).await {
            Ok(sorted) if sorted.len() == names.len() => sorted,
            Ok(sorted) => {
                warn!(
                    expected = names.len(),
                    actual = sorted.len(),
                    "sorted file list has a different length, keeping input order"
                );
                names.to_vec()
            }
            Err(error) => {
                warn!(error = %error, "file sorting failed, keeping input order");
                names.to_vec()
            }
        }
    }

    async fn try_sort_file_names(&self, names: &[String]) -> Result<Vec<String>, LlmError> {
        let listing = serde_json::to_string(names)?;
        let content = format!(
            "Sort the following list of filenames in the most logical chronological or numerical order \
             (e.g. Lecture 1 before Lecture 2, Chapter 1 before 10).\n\n\
             Input list:\n{listing}\n\n\
             Output a strict JSON list of strings (sorted):\n[\"file1.pdf\", \"file2.pdf\", ...]"
        );
        let request = GenerationRequest::new(&self.models.sorting, content)
            .with_sampling(SamplingParams::new().with_temperature(0.0).with_json_output());

        let generation = self.dispatcher.generate(&request).await?;
        Ok(serde_json::from_str(&strip_code_fences(&generation.text))?)
    }

    /// Reference passages for a chunk, excluding the chunk itself.
    async fn grounding_for(&self, chunk: &str) -> Option<String> {
        let passages = self.passages_for(chunk, GROUNDING_PASSAGES + 1).await?;
        let lines: Vec<String> = passages
            .into_iter()
            .filter(|text| text.trim() != chunk.trim())
            .take(GROUNDING_PASSAGES)
            .map(|text| format!("- {text}"))
            .collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    /// Texts of the `k` stored passages closest to `query`, or `None` when
    /// there is no store, nothing matches or the search fails.
    async fn passages_for(&self, query: &str, k: usize) -> Option<Vec<String>> {
        let store = self.store.as_ref()?;
        match store.search(query, k).await {
            Ok(found) if !found.is_empty() => Some(found.into_iter().map(|p| p.chunk.text).collect()),
            Ok(_) => None,
            Err(error) => {
                warn!(error = %error, "passage search failed, continuing without context");
                None
            }
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
