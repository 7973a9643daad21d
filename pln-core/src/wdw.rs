//! Extração "quem fez o quê" a partir dos chunks do nível superior da árvore:
//! um chunk nominal, um verbal e outro nominal, em sequência.

use serde::{Deserialize, Serialize};

use crate::language::Sentence;
use crate::parse_tree::{NodeId, ParseTree};

const NOUN_CHUNKS: [&str; 2] = ["sn-chunk", "n-chunk"];
const VERB_CHUNK: &str = "vb-chunk";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub who: String,
    pub did: String,
    pub what: String,
}

/// Triplas da árvore `k` da sentença (vazio se não houver árvore).
pub fn extract_triples(sentence: &Sentence, k: usize) -> Vec<Triple> {
    let Some(tree) = sentence.parse_tree(k) else {
        return vec![];
    };
    let mut out = vec![];
    let mut parts: Vec<String> = Vec::with_capacity(3);

    for &child in tree.children(tree.root()) {
        let label = tree.node(child).label.as_str();
        let noun = NOUN_CHUNKS.contains(&label);
        if parts.len() == 3 && label != VERB_CHUNK {
            out.push(take_triple(&mut parts));
        }
        let expected = match parts.len() {
            0 | 2 => noun,
            1 => label == VERB_CHUNK,
            _ => false,
        };
        if !expected {
            parts.clear();
        }
        if expected || noun {
            parts.push(leaves_text(tree, child, sentence));
        }
    }
    if parts.len() == 3 {
        out.push(take_triple(&mut parts));
    }
    out
}

fn take_triple(parts: &mut Vec<String>) -> Triple {
    let what = parts.pop().unwrap_or_default();
    let did = parts.pop().unwrap_or_default();
    let who = parts.pop().unwrap_or_default();
    Triple { who, did, what }
}

fn leaves_text(tree: &ParseTree, id: NodeId, sentence: &Sentence) -> String {
    let mut forms: Vec<&str> = vec![];
    let mut stack = vec![id];
    while let Some(n) = stack.pop() {
        let children = tree.children(n);
        if children.is_empty() {
            if let Some(w) = tree.node(n).word.and_then(|p| sentence.words.get(p)) {
                forms.push(&w.form);
            }
        } else {
            stack.extend(children.iter().rev());
        }
    }
    forms.join(" ")
}
