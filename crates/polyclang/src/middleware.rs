//! Adapting server responses to the editor
//!
//! The editor re-ranks completion items by fuzzy-matching the typed word
//! against each item's filter text. clangd already ranks its results, and
//! may replace text before the word start (`editsNearCursor`), so the
//! typed prefix is folded into every filter text and the list is marked
//! incomplete to force a fresh request on each keystroke.

use lsp_types::{CompletionItem, CompletionList, CompletionResponse, CompletionTextEdit, Position};

use crate::error::ClientError;

/// Method whose error responses are shown to the user
pub const EXECUTE_COMMAND: &str = "workspace/executeCommand";

/// Rewrite a completion response so the editor keeps the server's order.
///
/// `line_text` is the text of the cursor line, `cursor` the completion
/// position.
pub fn rerank_completion(
    response: Option<CompletionResponse>,
    line_text: &str,
    cursor: Position,
) -> CompletionList {
    let items = match response {
        Some(CompletionResponse::Array(items)) => items,
        Some(CompletionResponse::List(list)) => list.items,
        None => Vec::new(),
    };

    let items = items
        .into_iter()
        .map(|item| prefix_filter_text(item, line_text, cursor))
        .collect();

    CompletionList {
        is_incomplete: true,
        items,
    }
}

fn prefix_filter_text(mut item: CompletionItem, line_text: &str, cursor: Position) -> CompletionItem {
    let start = match &item.text_edit {
        Some(CompletionTextEdit::Edit(edit)) => edit.range.start,
        Some(CompletionTextEdit::InsertAndReplace(edit)) => edit.replace.start,
        None => return item,
    };
    if start.line != cursor.line {
        return item;
    }

    let prefix = utf16_slice(line_text, start.character, cursor.character);
    if prefix.is_empty() {
        return item;
    }

    let base = item.filter_text.take().unwrap_or_else(|| item.label.clone());
    item.filter_text = Some(format!("{prefix}_{base}"));
    item
}

/// Substring between two UTF-16 code unit offsets, clamped to the line
fn utf16_slice(text: &str, from: u32, to: u32) -> String {
    if from >= to {
        return String::new();
    }
    let mut offset = 0u32;
    let mut out = String::new();
    for ch in text.chars() {
        if offset >= to {
            break;
        }
        if offset >= from {
            out.push(ch);
        }
        offset += ch.len_utf16() as u32;
    }
    out
}

/// What to do with a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Show the error to the user
    Surface,
    /// Log it and carry on
    Log,
}

/// Only user-triggered commands rejected by the server are surfaced;
/// background request failures are noise to the user.
pub fn failure_disposition(method: &str, error: &ClientError) -> FailureDisposition {
    if method == EXECUTE_COMMAND && error.is_response_error() {
        FailureDisposition::Surface
    } else {
        FailureDisposition::Log
    }
}
