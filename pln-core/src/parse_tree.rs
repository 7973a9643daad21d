//! # Árvore Sintática em Arena
//!
//! Nós guardados num `Vec`, ligados por índices de pai/filhos. Enxertar uma
//! subárvore copia os nós (nada é compartilhado entre árvores), o que permite ao
//! parser "elevar" filhos ocultos sem religar ponteiros.
//!
//! Folhas apontam para a palavra pela posição na [`Sentence`].

use serde::{Deserialize, Serialize};

use crate::language::Sentence;

/// Índice de um nó dentro da arena.
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Rótulo gramatical (`sn`, `grup-verb`, tag da palavra nas folhas...).
    pub label: String,
    /// Marca o filho governante da regra.
    pub head: bool,
    /// Ordem do chunk no nível superior (0 = não é chunk).
    pub chunk: usize,
    /// Posição da palavra na sentença, para folhas.
    pub word: Option<usize>,
    /// Identificador `"<sid>.<n>"` atribuído por [`ParseTree::build_node_index`].
    pub id: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            head: false,
            chunk: 0,
            word: None,
            id: String::new(),
            parent: None,
            children: vec![],
        }
    }

    pub fn is_chunk(&self) -> bool {
        self.chunk != 0
    }
}

/// Árvore n-ária; o nó 0 é a raiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTree {
    nodes: Vec<Node>,
}

impl ParseTree {
    /// Árvore com um único nó.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node::new(label)],
        }
    }

    /// Folha ligada à palavra da posição `word`.
    pub fn leaf(label: impl Into<String>, word: usize) -> Self {
        let mut t = Self::new(label);
        t.nodes[0].word = Some(word);
        t
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn num_children(&self, id: NodeId) -> usize {
        self.nodes[id].children.len()
    }

    pub fn nth_child(&self, id: NodeId, n: usize) -> Option<NodeId> {
        self.nodes[id].children.get(n).copied()
    }

    /// Cria um filho vazio com o rótulo dado.
    pub fn add_child(&mut self, parent: NodeId, label: impl Into<String>) -> NodeId {
        let id = self.nodes.len();
        let mut node = Node::new(label);
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    /// Enxerta uma cópia da árvore `other` inteira como último filho de `parent`.
    pub fn append_child(&mut self, parent: NodeId, other: &ParseTree) -> NodeId {
        self.append_subtree(parent, other, other.root())
    }

    /// Enxerta uma cópia da subárvore `from` de `other` como último filho de `parent`.
    pub fn append_subtree(&mut self, parent: NodeId, other: &ParseTree, from: NodeId) -> NodeId {
        let id = self.nodes.len();
        let src = &other.nodes[from];
        self.nodes.push(Node {
            parent: Some(parent),
            children: vec![],
            ..src.clone()
        });
        self.nodes[parent].children.push(id);
        for &child in &src.children {
            self.append_subtree(id, other, child);
        }
        id
    }

    /// Nós em pré-ordem a partir da raiz.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        out
    }

    /// Folhas da esquerda para a direita.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.nodes[id].children.is_empty())
            .collect()
    }

    /// Numera os nós em pré-ordem como `"<sid>.<n>"`.
    pub fn build_node_index(&mut self, sentence_id: &str) {
        for (n, id) in self.preorder().into_iter().enumerate() {
            self.nodes[id].id = format!("{sentence_id}.{n}");
        }
    }

    /// Impressão em colchetes:
    ///
    /// ```text
    /// S_[
    ///   sn_[
    ///     +(John john NP)
    ///   ]
    /// ]
    /// ```
    pub fn render(&self, sentence: &Sentence, k: usize) -> String {
        let mut out = String::new();
        self.render_node(self.root(), 0, sentence, k, &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, sentence: &Sentence, k: usize, out: &mut String) {
        let node = &self.nodes[id];
        out.push_str(&" ".repeat(depth * 2));
        if node.head {
            out.push('+');
        }
        if node.children.is_empty() {
            if let Some(w) = node.word.and_then(|p| sentence.words.get(p)) {
                out.push_str(&format!("({} {} {})\n", w.form, w.lemma(k), w.tag(k)));
            } else {
                out.push_str(&format!("{}\n", node.label));
            }
        } else {
            out.push_str(&node.label);
            out.push_str("_[\n");
            for &child in &node.children {
                self.render_node(child, depth + 1, sentence, k, out);
            }
            out.push_str(&" ".repeat(depth * 2));
            out.push_str("]\n");
        }
    }
}
