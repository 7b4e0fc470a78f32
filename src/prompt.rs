//! Prompt template and context formatting.
//!
//! The built-in template tells the model how to resolve contradictions
//! between retrieved policies: intern-specific rules beat general employee
//! rules, 2024 updates beat the v1 handbook, and the answer must cite the
//! file it relied on.

use anyhow::{bail, Context, Result};
use std::path::Path;

use conflict_rag_core::retrieve::RetrievedDocument;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

pub const CONFLICT_AWARE_TEMPLATE: &str = r#"
You are an intelligent HR Policy Assistant for the company NebulaGears.
Your task is to answer the employee questions based STRICTLY on the provided context.

CRITICAL RULES FOR CONFLICT RESOLUTION:
1. **Analyze the User's Role:** Check if the user is an Intern, Manager, or General Employee.
2. **Apply Policy Hierarchy:** - "Intern" specific policies OVERRIDE general "Employee" policies.
   - Newer updates (2024) OVERRIDE older handbooks (v1).
3. **Citation:** You must mention the exact filename of the document that supports your final solution.

Context Documents:
{context}

User Question: {question}

Answer:
"#;

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Parse a template. Both `{context}` and `{question}` must appear.
    pub fn from_template(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                bail!("prompt template is missing the {} placeholder", placeholder);
            }
        }
        Ok(Self { template })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;
        Self::from_template(text)
            .with_context(|| format!("Invalid prompt template: {}", path.display()))
    }

    /// The built-in template, or the file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::from_template(CONFLICT_AWARE_TEMPLATE),
        }
    }

    /// Substitute the placeholders in one pass. Braces inside `context` or
    /// `question` are copied through untouched.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: CONFLICT_AWARE_TEMPLATE.to_string(),
        }
    }
}

/// Format retrieved passages as `[Source: <file>]` blocks separated by a blank line.
pub fn format_context(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .map(|d| format!("[Source: {}]\n{}", d.source, d.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
