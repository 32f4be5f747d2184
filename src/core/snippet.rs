//! Code snippet classification.
//!
//! Turns tokenizer output into `Snippet`s tagged with the language the
//! document author declared. Only `yaml` and `bash` fences are executable.

use serde::Serialize;

use crate::markdown::Token;

pub const LANG_CODE_BLOCK: &str = "code";
pub const LANG_CODE_INLINE: &str = "code inline";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snippet {
    pub content: String,
    pub lang: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetKind {
    Yaml,
    Bash,
    Other,
}

impl Snippet {
    /// An empty snippet carries nothing to write.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Exact, case-sensitive match on the declared language.
    pub fn kind(&self) -> SnippetKind {
        match self.lang.as_str() {
            "yaml" => SnippetKind::Yaml,
            "bash" => SnippetKind::Bash,
            _ => SnippetKind::Other,
        }
    }
}

/// Extract the code snippet carried by a token, if any.
pub fn classify(token: &Token) -> Snippet {
    match token {
        Token::CodeBlock { content } => Snippet {
            content: content.clone(),
            lang: LANG_CODE_BLOCK.to_string(),
        },
        Token::CodeInline { content } => Snippet {
            content: content.clone(),
            lang: LANG_CODE_INLINE.to_string(),
        },
        Token::Fence { params, content } => Snippet {
            content: content.clone(),
            lang: params.clone(),
        },
        Token::Text(_) => Snippet::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fence(params: &str, content: &str) -> Token {
        Token::Fence {
            params: params.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn fence_language_is_used_verbatim() {
        assert_eq!(classify(&fence("yaml", "a: 1\n")).kind(), SnippetKind::Yaml);
        assert_eq!(classify(&fence("bash", "ls\n")).kind(), SnippetKind::Bash);
        assert_eq!(classify(&fence("Bash", "ls\n")).kind(), SnippetKind::Other);
        assert_eq!(classify(&fence("yaml ", "a: 1\n")).kind(), SnippetKind::Other);
        assert_eq!(classify(&fence("sh", "ls\n")).kind(), SnippetKind::Other);
    }

    #[test]
    fn plain_code_gets_fixed_tags() {
        let block = classify(&Token::CodeBlock {
            content: "kubectl get pods\n".to_string(),
        });
        assert_eq!(block.lang, "code");
        assert_eq!(block.kind(), SnippetKind::Other);

        let inline = classify(&Token::CodeInline {
            content: "pxctl status".to_string(),
        });
        assert_eq!(inline.lang, "code inline");
    }

    #[test]
    fn text_yields_empty_snippet() {
        let snippet = classify(&Token::Text("hello".to_string()));
        assert!(snippet.is_empty());
    }
}
