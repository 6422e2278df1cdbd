//! Natural language to SQL through the text-generation endpoint.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::TranslationError;
use crate::llm::{ChatMessage, ChatRequest, TextGenerator};

const SYSTEM_PROMPT: &str = "You are a strict SQL generator. Always return only SQL code.";

pub struct Translator {
    generator: Arc<dyn TextGenerator>,
    model: String,
    max_tokens: Option<u32>,
}

impl Translator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self {
            generator,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    /// The exact request sent for `input`. Temperature is pinned to zero.
    pub fn request_for(&self, input: &str, schema_hint: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(input, schema_hint)),
            ],
            temperature: Some(0.0),
            max_tokens: self.max_tokens,
        }
    }

    /// Translate `input` into SQL. Never retried.
    pub async fn translate(&self, input: &str, schema_hint: &str) -> Result<String, TranslationError> {
        let request = self.request_for(input, schema_hint);
        let response = self.generator.complete(&request).await?;
        let raw = response.first_content().ok_or(TranslationError::NoChoices)?;

        let sql = clean_response(raw);
        if sql.is_empty() {
            return Err(TranslationError::EmptySql);
        }
        tracing::debug!(%sql, "translated request");
        Ok(sql)
    }

    /// Round-trip a tiny prompt to check the endpoint and key.
    pub async fn ping(&self) -> Result<String, TranslationError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user("ping")],
            temperature: None,
            max_tokens: Some(5),
        };
        let response = self.generator.complete(&request).await?;
        let content = response.first_content().unwrap_or("").trim();
        if content.is_empty() {
            Ok("ok".to_string())
        } else {
            Ok(content.to_string())
        }
    }
}

pub fn build_prompt(input: &str, schema_hint: &str) -> String {
    format!(
        "You are an SQL generator.\n\
         Database schema:\n\
         {schema_hint}\n\
         \n\
         Convert the following request into a valid PostgreSQL query.\n\
         Return ONLY the SQL code without explanation, no markdown, no extra text.\n\
         \n\
         Request: {input}"
    )
}

/// Strip one enclosing code fence and a stray leading `sql` language line.
pub fn clean_response(raw: &str) -> String {
    let sql = strip_code_fence(raw);
    let tagged = sql
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sql\n"));
    if tagged {
        sql[4..].trim_start().to_string()
    } else {
        sql
    }
}

fn strip_code_fence(raw: &str) -> String {
    let text = raw.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 2 {
        return text.to_string();
    }
    // Opening line carries the fence and maybe a language tag.
    let body = if lines[lines.len() - 1].trim_start().starts_with("```") {
        &lines[1..lines.len() - 1]
    } else {
        &lines[1..]
    };
    body.join("\n").trim().to_string()
}
