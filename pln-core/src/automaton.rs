//! # Varredura por Autômato
//!
//! Driver compartilhado pelos detectores de multipalavras (locuções e nomes
//! próprios). Cada detector define estados, tokens e um estado de varredura
//! próprio; o driver percorre a sentença a partir de cada palavra não travada,
//! guarda o casamento mais longo que termina num estado final e pede ao detector
//! para construir a multipalavra.
//!
//! O estado de varredura (`ScanState`) vive só durante uma chamada de [`matching`].

use std::fmt::Debug;

use crate::language::{Sentence, Word};
use crate::logging::Logger;

/// Um detector dirigido por autômato finito.
pub trait Automaton {
    type State: Copy + PartialEq + Debug;
    type Token: Copy + Debug;
    type ScanState: Default;

    fn initial_state(&self) -> Self::State;
    fn is_stop(&self, state: Self::State) -> bool;
    fn is_final(&self, state: Self::State) -> bool;
    fn transition(&self, state: Self::State, token: Self::Token) -> Self::State;

    /// Classifica a palavra `idx`. Pode ajustar a seleção de análises da palavra.
    fn compute_token(&self, state: Self::State, words: &mut [Word], idx: usize, status: &mut Self::ScanState)
        -> Self::Token;

    /// Ações ao passar de `from` para `to`.
    fn state_actions(
        &self,
        _from: Self::State,
        _to: Self::State,
        _token: Self::Token,
        _idx: usize,
        _status: &mut Self::ScanState,
    ) {
    }

    /// Constrói a multipalavra `start..=end`. Devolve a posição onde a varredura
    /// continua, ou `None` se o casamento foi rejeitado (sentença intocada).
    fn build_multiword(
        &self,
        sentence: &mut Sentence,
        start: usize,
        end: usize,
        final_state: Self::State,
        status: &mut Self::ScanState,
    ) -> Option<usize>;

    fn logger(&self) -> &Logger;
}

/// Procura o casamento mais longo começando em `start`.
pub fn matching<A: Automaton>(automaton: &A, sentence: &mut Sentence, start: usize) -> Option<usize> {
    let log = automaton.logger();
    let mut status = A::ScanState::default();
    let mut state = automaton.initial_state();
    let mut last_final = None;

    let mut j = start;
    while !automaton.is_stop(state) && j < sentence.words.len() {
        let token = automaton.compute_token(state, &mut sentence.words, j, &mut status);
        let next = automaton.transition(state, token);
        log.trace(format!(
            "word '{}' token {token:?}: {state:?} -> {next:?}",
            sentence.words[j].form
        ));
        automaton.state_actions(state, next, token, j, &mut status);
        state = next;
        if automaton.is_final(state) {
            last_final = Some((j, state));
        }
        j += 1;
    }

    let (end, final_state) = last_final?;
    log.trace(format!("candidate match {start}..={end}"));
    automaton.build_multiword(sentence, start, end, final_state, &mut status)
}

/// Varre a sentença inteira. Devolve `true` se alguma multipalavra foi construída.
pub fn scan<A: Automaton>(automaton: &A, sentence: &mut Sentence) -> bool {
    let mut found = false;
    let mut i = 0;
    while i < sentence.words.len() {
        if sentence.words[i].locked {
            automaton
                .logger()
                .trace(format!("word '{}' is locked, skipped", sentence.words[i].form));
            i += 1;
            continue;
        }
        match matching(automaton, sentence, i) {
            Some(next) => {
                found = true;
                i = next.max(i + 1);
            }
            None => i += 1,
        }
    }
    if found {
        sentence.rebuild_word_index();
    }
    found
}

/// Substitui `words[start..=end]` por uma multipalavra com esses componentes.
pub fn collapse(sentence: &mut Sentence, start: usize, end: usize) -> &mut Word {
    let components: Vec<Word> = sentence.words.drain(start..=end).collect();
    let form = components
        .iter()
        .map(|w| w.form.as_str())
        .collect::<Vec<_>>()
        .join("_");
    let mw = Word::multiword(form, components);
    sentence.words.insert(start, mw);
    &mut sentence.words[start]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Agrupa sequências de palavras "x".
    struct XRun(Logger);

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum St {
        In,
        X,
        Stop,
    }

    impl Automaton for XRun {
        type State = St;
        type Token = bool;
        type ScanState = usize;

        fn initial_state(&self) -> St {
            St::In
        }
        fn is_stop(&self, s: St) -> bool {
            s == St::Stop
        }
        fn is_final(&self, s: St) -> bool {
            s == St::X
        }
        fn transition(&self, _s: St, t: bool) -> St {
            if t {
                St::X
            } else {
                St::Stop
            }
        }
        fn compute_token(&self, _s: St, words: &mut [Word], idx: usize, seen: &mut usize) -> bool {
            *seen += 1;
            words[idx].form == "x"
        }
        fn build_multiword(&self, s: &mut Sentence, start: usize, end: usize, _f: St, _st: &mut usize) -> Option<usize> {
            if start == end {
                return None;
            }
            collapse(s, start, end);
            Some(start + 1)
        }
        fn logger(&self) -> &Logger {
            &self.0
        }
    }

    #[test]
    fn test_scan_collapses_longest_runs() {
        let words = ["a", "x", "x", "x", "b", "x", "c"].map(Word::new).to_vec();
        let mut s = Sentence::from_words(words);
        assert!(scan(&XRun(Logger::null()), &mut s));
        let forms: Vec<&str> = s.words.iter().map(|w| w.form.as_str()).collect();
        assert_eq!(forms, vec!["a", "x_x_x", "b", "x", "c"]);
        assert_eq!(s.words[1].multiword.len(), 3);
        assert_eq!(s.words[4].position, 4);
    }

    #[test]
    fn test_locked_words_are_skipped() {
        let mut words = ["x", "x"].map(Word::new).to_vec();
        words[0].lock();
        let mut s = Sentence::from_words(words);
        assert!(!scan(&XRun(Logger::null()), &mut s));
        assert_eq!(s.len(), 2);
    }
}
