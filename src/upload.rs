//! Upload form validation.

use serde::Serialize;

pub const MAX_FILENAME_CHARS: usize = 255;
pub const MAX_LANGUAGE_HINT_CHARS: usize = 50;
pub const LANGUAGE_HINT_HELP: &str = "Optional language hint: python, java, c, cpp";

/// Fields as they arrived, before validation.
#[derive(Debug, Default, Clone)]
pub struct RawUpload {
    pub filename: Option<String>,
    pub content: Option<Vec<u8>>,
    pub language_hint: Option<String>,
}

/// A validated upload with its source already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeUpload {
    pub filename: String,
    pub code_text: String,
    pub language_hint: String,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct FormErrors {
    pub file: Vec<String>,
    pub language_hint: Vec<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.file.is_empty() && self.language_hint.is_empty()
    }
}

impl RawUpload {
    pub fn validate(self) -> Result<CodeUpload, FormErrors> {
        let mut errors = FormErrors::default();

        let filename = self
            .filename
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        match (&filename, &self.content) {
            (None, _) | (_, None) => errors.file.push("No file was submitted.".to_string()),
            (Some(_), Some(bytes)) if bytes.is_empty() => {
                errors.file.push("The submitted file is empty.".to_string())
            }
            (Some(name), _) if name.chars().count() > MAX_FILENAME_CHARS => {
                errors.file.push(format!(
                    "Ensure this filename has at most {} characters (it has {}).",
                    MAX_FILENAME_CHARS,
                    name.chars().count()
                ))
            }
            _ => {}
        }

        let language_hint = self.language_hint.unwrap_or_default().trim().to_string();
        let hint_len = language_hint.chars().count();
        if hint_len > MAX_LANGUAGE_HINT_CHARS {
            errors.language_hint.push(format!(
                "Ensure this value has at most {} characters (it has {}).",
                MAX_LANGUAGE_HINT_CHARS, hint_len
            ));
        }

        match (filename, self.content) {
            (Some(filename), Some(content)) if errors.is_empty() => Ok(CodeUpload {
                filename,
                code_text: decode_source(&content),
                language_hint,
            }),
            _ => Err(errors),
        }
    }
}

/// UTF-8 when valid, otherwise Latin-1 (every byte maps to one char).
pub fn decode_source(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
