//! # Treliça de Viterbi com k Melhores Caminhos
//!
//! A decodificação do HMM é **programação dinâmica**: o melhor caminho até o
//! instante `t` no estado `s` depende apenas dos melhores caminhos até `t-1`.
//! Para obter os `k` melhores caminhos completos, cada célula `(t, s)` guarda não
//! um, mas até `k` pares (predecessor, índice k do predecessor), ordenados por
//! log-probabilidade.
//!
//! ```text
//! delta(t, s, k)  = log-prob do k-ésimo melhor caminho até (t, s)
//! phi(t, s, k)    = (estado em t-1, índice k usado em t-1)
//! ```
//!
//! Os estados são bigramas de tags: `(tag anterior, tag atual)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Log-probabilidade de um evento impossível.
pub const ZERO_LOGPROB: f64 = f64::NEG_INFINITY;

/// Estado do HMM: par de tags curtas consecutivas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bigram {
    pub first: String,
    pub second: String,
}

impl Bigram {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Estado antes do início da sentença.
    pub fn initial() -> Self {
        Self::new("0", "0")
    }

    /// Estado fictício após o fim da sentença.
    pub fn end() -> Self {
        Self::new("ENDSTATE", "ENDSTATE")
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    state: Bigram,
    kbest: usize,
    prob: f64,
}

/// Treliça `T × estados`, cada célula com no máximo `kbest` entradas.
#[derive(Debug, Clone)]
pub struct Trellis {
    kbest: usize,
    cells: Vec<HashMap<Bigram, Vec<Element>>>,
}

impl Trellis {
    pub fn new(steps: usize, kbest: usize) -> Self {
        Self {
            kbest: kbest.max(1),
            cells: vec![HashMap::new(); steps],
        }
    }

    pub fn kbest(&self) -> usize {
        self.kbest
    }

    /// Registra um caminho que chega a `(t, s)` vindo de `(t-1, prev)` pelo seu
    /// `kb`-ésimo melhor caminho. Mantém só os `kbest` mais prováveis; em caso de
    /// empate, o que chegou antes fica na frente.
    pub fn insert(&mut self, t: usize, s: &Bigram, prev: &Bigram, kb: usize, prob: f64) {
        let kbest = self.kbest;
        let cell = self.cells[t].entry(s.clone()).or_default();
        if cell.len() == kbest && cell.last().is_some_and(|worst| prob <= worst.prob) {
            return;
        }
        let at = cell.partition_point(|e| e.prob >= prob);
        cell.insert(
            at,
            Element {
                state: prev.clone(),
                kbest: kb,
                prob,
            },
        );
        cell.truncate(kbest);
    }

    /// Log-probabilidade do `k`-ésimo melhor caminho até `(t, s)`.
    pub fn delta(&self, t: usize, s: &Bigram, k: usize) -> f64 {
        self.cells[t]
            .get(s)
            .and_then(|cell| cell.get(k))
            .map_or(ZERO_LOGPROB, |e| e.prob)
    }

    /// Predecessor do `k`-ésimo melhor caminho até `(t, s)`.
    pub fn phi(&self, t: usize, s: &Bigram, k: usize) -> Option<(&Bigram, usize)> {
        self.cells[t]
            .get(s)
            .and_then(|cell| cell.get(k))
            .map(|e| (&e.state, e.kbest))
    }

    /// Número de caminhos guardados em `(t, s)`.
    pub fn nbest(&self, t: usize, s: &Bigram) -> usize {
        self.cells[t].get(s).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_k_best_in_order() {
        let mut tr = Trellis::new(2, 2);
        let s = Bigram::new("NC", "VM");
        tr.insert(1, &s, &Bigram::new("0", "NC"), 0, -3.0);
        tr.insert(1, &s, &Bigram::new("0", "NC"), 1, -1.0);
        tr.insert(1, &s, &Bigram::new("0", "NC"), 2, -2.0);
        assert_eq!(tr.nbest(1, &s), 2);
        assert_eq!(tr.delta(1, &s, 0), -1.0);
        assert_eq!(tr.delta(1, &s, 1), -2.0);
        assert_eq!(tr.phi(1, &s, 1).map(|(_, kb)| kb), Some(2));
    }

    #[test]
    fn test_worse_than_all_is_discarded() {
        let mut tr = Trellis::new(1, 1);
        let s = Bigram::new("0", "NC");
        tr.insert(0, &s, &Bigram::initial(), 0, -1.0);
        tr.insert(0, &s, &Bigram::initial(), 0, -5.0);
        assert_eq!(tr.nbest(0, &s), 1);
        assert_eq!(tr.delta(0, &s, 0), -1.0);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut tr = Trellis::new(1, 3);
        let s = Bigram::new("0", "NC");
        tr.insert(0, &s, &Bigram::new("a", "a"), 0, -1.0);
        tr.insert(0, &s, &Bigram::new("b", "b"), 0, -1.0);
        assert_eq!(tr.phi(0, &s, 0).map(|(b, _)| b.first.as_str()), Some("a"));
        assert_eq!(tr.phi(0, &s, 1).map(|(b, _)| b.first.as_str()), Some("b"));
    }

    #[test]
    fn test_missing_cell_is_zero() {
        let tr = Trellis::new(1, 1);
        assert_eq!(tr.delta(0, &Bigram::end(), 0), ZERO_LOGPROB);
        assert!(tr.phi(0, &Bigram::end(), 0).is_none());
    }
}
