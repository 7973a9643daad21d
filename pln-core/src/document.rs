//! # Documentos de Entrada e Saída
//!
//! O motor recebe um [`DocumentInput`] (texto ou URL) e devolve um
//! [`DocumentOutput`] com as sentenças analisadas, as entidades do extrator
//! externo e a contagem de nomes próprios que ele não reconheceu.
//!
//! ```json
//! {
//!   "status": "done",
//!   "sentences": [
//!     { "body": "John_Smith went to Paris .",
//!       "tokens": [ { "form": "John_Smith", "lemma": "john_smith", "tag": "NP", "prob": 1.0 } ] }
//!   ],
//!   "unknown_entities": { "John Smith": 1 }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collaborators::GlossAnnotator;
use crate::knowledge::{KnowledgeBase, KnowledgeEntry};
use crate::language::{Sense, Sentence, Word};
use crate::wdw::{extract_triples, Triple};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentInput {
    pub url: String,
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub content: String,
    pub language: String,
}

impl DocumentInput {
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Texto analisado: título, descrição, palavras-chave e conteúdo.
    pub fn body(&self) -> String {
        [&self.title, &self.description, &self.keywords, &self.content]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

/// Entidade devolvida pelo extrator externo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    #[serde(rename = "type")]
    pub model: String,
    pub score: f64,
    #[serde(rename = "name")]
    pub value: String,
}

impl NamedEntity {
    pub fn new(model: impl Into<String>, score: f64, value: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            score,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossAnnotation {
    pub pos: String,
    pub words: Vec<String>,
    #[serde(rename = "glossary")]
    pub gloss: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenOutput {
    pub form: String,
    pub lemma: String,
    pub tag: String,
    pub prob: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub senses: Vec<Sense>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<GlossAnnotation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge: Vec<KnowledgeEntry>,
}

impl TokenOutput {
    /// Usa a primeira análise escolhida (ou a primeira da lista).
    pub fn from_word(word: &Word) -> Self {
        let analysis = word.first_selected(0).or_else(|| word.analyses.first());
        Self {
            form: word.form.clone(),
            lemma: analysis.map(|a| a.lemma.clone()).unwrap_or_default(),
            tag: analysis.map(|a| a.tag.clone()).unwrap_or_default(),
            prob: analysis.map(|a| a.prob).unwrap_or(-1.0),
            senses: analysis.map(|a| a.senses.clone()).unwrap_or_default(),
            annotations: vec![],
            knowledge: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentenceOutput {
    pub id: String,
    pub body: String,
    pub tokens: Vec<TokenOutput>,
    /// Árvore de chunks impressa, quando houve análise sintática.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triples: Vec<Triple>,
}

impl SentenceOutput {
    pub fn from_sentence(
        sentence: &Sentence,
        glosses: Option<&dyn GlossAnnotator>,
        knowledge: Option<&KnowledgeBase>,
    ) -> Self {
        let tokens = sentence
            .words
            .iter()
            .map(|w| {
                let mut token = TokenOutput::from_word(w);
                if let Some(g) = glosses {
                    token.annotations = g.annotate(&token.form, &token.tag);
                }
                if let Some(kb) = knowledge {
                    token.knowledge = kb.annotate(w).into_iter().cloned().collect();
                }
                token
            })
            .collect();
        Self {
            id: sentence.id.clone(),
            body: sentence.body(),
            tokens,
            tree: tree_text(sentence, 0),
            triples: extract_triples(sentence, 0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub id: String,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub top_image: String,
    pub sentences: Vec<SentenceOutput>,
    pub entities: Vec<NamedEntity>,
    pub unknown_entities: BTreeMap<String, u64>,
    /// Motivo da falha, quando `status` é `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentOutput {
    pub fn new(id: impl Into<String>, input: &DocumentInput) -> Self {
        Self {
            id: id.into(),
            url: input.url.clone(),
            title: input.title.clone(),
            description: input.description.clone(),
            keywords: input.keywords.clone(),
            content: input.content.clone(),
            ..Self::default()
        }
    }

    pub fn failed(id: impl Into<String>, input: &DocumentInput, message: impl Into<String>) -> Self {
        Self {
            status: DocumentStatus::Failed,
            error: Some(message.into()),
            ..Self::new(id, input)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DocumentStatus::Failed
    }

    /// Corpos das sentenças, um por linha.
    pub fn text(&self) -> String {
        self.sentences
            .iter()
            .map(|s| s.body.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Uma linha `forma:etiquetas` por palavra, com as análises escolhidas em `k`.
pub fn tagged_list(sentence: &Sentence, k: usize) -> String {
    let mut out = String::new();
    for w in &sentence.words {
        out.push_str(&w.form);
        out.push(':');
        for a in w.selected(k) {
            out.push_str(&a.tag);
        }
        out.push('\n');
    }
    out
}

pub fn tree_text(sentence: &Sentence, k: usize) -> Option<String> {
    sentence.parse_tree(k).map(|t| t.render(sentence, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Analysis;
    use crate::parse_tree::ParseTree;

    struct Glosses;

    impl GlossAnnotator for Glosses {
        fn annotate(&self, form: &str, tag: &str) -> Vec<GlossAnnotation> {
            vec![GlossAnnotation {
                pos: tag.to_lowercase(),
                words: vec![form.to_lowercase()],
                gloss: format!("gloss of {form}"),
            }]
        }
    }

    fn sentence() -> Sentence {
        let mut john = Word::new("John");
        john.set_analysis(vec![Analysis::new("john", "NP").with_prob(1.0)]);
        let mut runs = Word::new("runs");
        runs.set_analysis(vec![
            Analysis::new("run", "VBZ").with_prob(0.8),
            Analysis::new("run", "NNS").with_prob(0.2),
        ]);
        let mut s = Sentence::from_words(vec![john, runs]);
        s.id = "1".into();
        s
    }

    #[test]
    fn test_body_skips_empty_fields() {
        let input = DocumentInput {
            title: "Title".into(),
            content: "Some text.".into(),
            ..DocumentInput::default()
        };
        assert_eq!(input.body(), "Title Some text.");
    }

    #[test]
    fn test_sentence_output_uses_selected_analysis() {
        let out = SentenceOutput::from_sentence(&sentence(), Some(&Glosses), None);
        assert_eq!(out.body, "John runs");
        assert_eq!(out.tokens[1].lemma, "run");
        assert_eq!(out.tokens[1].tag, "VBZ");
        assert_eq!(out.tokens[1].prob, 0.8);
        assert_eq!(out.tokens[0].annotations[0].gloss, "gloss of John");
        assert!(out.tree.is_none());
    }

    #[test]
    fn test_tagged_list_and_tree() {
        let mut s = sentence();
        assert_eq!(tagged_list(&s, 0), "John:NP\nruns:VBZNNS\n");

        let mut tree = ParseTree::new("S");
        tree.append_child(0, &ParseTree::leaf("NP", 0));
        tree.append_child(0, &ParseTree::leaf("VBZ", 1));
        s.set_parse_tree(0, tree);
        let text = tree_text(&s, 0).unwrap();
        assert!(text.starts_with("S_[\n"));
        assert!(text.contains("(John john NP)"));
    }

    #[test]
    fn test_entity_json_field_names() {
        let e = NamedEntity::new("PERSON", 0.9, "John Smith");
        let js = serde_json::to_value(&e).unwrap();
        assert_eq!(js["type"], "PERSON");
        assert_eq!(js["name"], "John Smith");
    }
}
