//! Client capability negotiation
//!
//! Capabilities are assembled from named pieces instead of being patched
//! into a prebuilt object: built-in features can be switched off by name
//! and optional extensions switched on by name.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::types::WorkspaceFolder;

/// Completion edits may touch text before the cursor (clangd extension)
pub const EDITS_NEAR_CURSOR: &str = "editsNearCursor";

/// Built-in semantic tokens support
pub const SEMANTIC_TOKENS: &str = "semanticTokens";

const OPTIONAL_CAPABILITIES: [&str; 1] = [EDITS_NEAR_CURSOR];

/// `textDocument` features advertised unless disabled
fn builtin_features() -> Vec<(&'static str, Value)> {
    vec![
        (
            "synchronization",
            json!({ "dynamicRegistration": false, "didSave": true, "willSave": false }),
        ),
        (
            "completion",
            json!({
                "contextSupport": true,
                "completionItem": {
                    "snippetSupport": true,
                    "insertReplaceSupport": true,
                    "documentationFormat": ["markdown", "plaintext"]
                }
            }),
        ),
        ("hover", json!({ "contentFormat": ["markdown", "plaintext"] })),
        (
            "signatureHelp",
            json!({ "signatureInformation": { "parameterInformation": { "labelOffsetSupport": true } } }),
        ),
        ("definition", json!({ "linkSupport": true })),
        ("references", json!({})),
        ("documentHighlight", json!({})),
        ("documentSymbol", json!({ "hierarchicalDocumentSymbolSupport": true })),
        ("codeAction", json!({ "isPreferredSupport": true })),
        ("formatting", json!({})),
        ("rename", json!({ "prepareSupport": true })),
        (
            "publishDiagnostics",
            json!({ "relatedInformation": true, "codeDescriptionSupport": true }),
        ),
        (
            SEMANTIC_TOKENS,
            json!({
                "requests": { "full": { "delta": true } },
                "tokenTypes": [],
                "tokenModifiers": [],
                "formats": ["relative"]
            }),
        ),
        ("inlayHint", json!({})),
    ]
}

/// Named registry of what this client advertises
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    enabled_optional: BTreeSet<String>,
    disabled_builtin: BTreeSet<String>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn on an optional capability; false when the name is unknown
    pub fn enable_capability(&mut self, name: &str) -> bool {
        if !OPTIONAL_CAPABILITIES.contains(&name) {
            warn!(capability = name, "Ignoring unknown optional capability");
            return false;
        }
        self.enabled_optional.insert(name.to_string());
        true
    }

    /// Suppress a built-in feature; false when the name is unknown
    pub fn disable_feature(&mut self, name: &str) -> bool {
        if !builtin_features().iter().any(|(feature, _)| *feature == name) {
            warn!(feature = name, "Ignoring unknown built-in feature");
            return false;
        }
        self.disabled_builtin.insert(name.to_string());
        true
    }

    pub fn is_capability_enabled(&self, name: &str) -> bool {
        self.enabled_optional.contains(name)
    }

    pub fn is_feature_enabled(&self, name: &str) -> bool {
        !self.disabled_builtin.contains(name)
    }

    /// The `capabilities` object for `initialize`
    pub fn client_capabilities(&self) -> Value {
        let mut text_document = Map::new();
        for (name, mut capability) in builtin_features() {
            if !self.is_feature_enabled(name) {
                continue;
            }
            if name == "completion" && self.is_capability_enabled(EDITS_NEAR_CURSOR) {
                capability[EDITS_NEAR_CURSOR] = Value::Bool(true);
            }
            text_document.insert(name.to_string(), capability);
        }

        json!({
            "textDocument": text_document,
            "workspace": { "workspaceFolders": true, "configuration": true },
            "window": { "workDoneProgress": true },
            "general": { "regularExpressions": { "engine": "ECMAScript" } }
        })
    }
}

/// Build `initialize` parameters for a client scoped to `root`
pub fn initialize_params(
    process_id: Option<u32>,
    root: &WorkspaceFolder,
    features: &FeatureRegistry,
    initialization_options: Value,
) -> Value {
    let root_path = root.uri.to_file_path();
    json!({
        "processId": process_id,
        "clientInfo": { "name": "polyclang", "version": env!("CARGO_PKG_VERSION") },
        "rootPath": root_path.to_string_lossy(),
        "rootUri": root.uri.as_str(),
        "workspaceFolders": [{ "uri": root.uri.as_str(), "name": root.name }],
        "capabilities": features.client_capabilities(),
        "initializationOptions": initialization_options,
    })
}
