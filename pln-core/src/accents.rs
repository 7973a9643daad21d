//! Restauração de acentos nas raízes candidatas da análise de afixos.
//!
//! Ao remover um sufixo, a raiz pode precisar ganhar ou perder um acento gráfico
//! para ser encontrada no dicionário (`dámelo` → `da`, `cantábamos`...). Cada idioma
//! tem seu tratador; o padrão não faz nada.

use std::collections::BTreeSet;

use crate::affixes::AffixRule;

/// Ajusta a acentuação das raízes candidatas geradas por uma regra.
pub trait AccentHandler: Send + Sync + std::fmt::Debug {
    fn fix_accentuation(&self, candidates: &mut BTreeSet<String>, rule: &AffixRule);
}

/// Tratador nulo (adequado para inglês).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAccents;

impl AccentHandler for DefaultAccents {
    fn fix_accentuation(&self, _candidates: &mut BTreeSet<String>, _rule: &AffixRule) {}
}

const ACCENTED: [(char, char); 5] = [('á', 'a'), ('é', 'e'), ('í', 'i'), ('ó', 'o'), ('ú', 'u')];

fn unaccent(c: char) -> char {
    ACCENTED.iter().find(|(a, _)| *a == c).map(|(_, p)| *p).unwrap_or(c)
}

fn accent(c: char) -> Option<char> {
    ACCENTED.iter().find(|(_, p)| *p == c).map(|(a, _)| *a)
}

fn is_vowel(c: char) -> bool {
    matches!(unaccent(c), 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Tratador do espanhol: para regras com `acc` ligado, acrescenta a variante sem
/// acento de cada raiz e, para raízes sem acento, as variantes com acento na última
/// e na penúltima vogal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanishAccents;

impl AccentHandler for SpanishAccents {
    fn fix_accentuation(&self, candidates: &mut BTreeSet<String>, rule: &AffixRule) {
        if !rule.acc {
            return;
        }
        let mut extra = BTreeSet::new();
        for root in candidates.iter() {
            let plain: String = root.chars().map(unaccent).collect();
            if plain != *root {
                extra.insert(plain);
                continue;
            }
            let chars: Vec<char> = root.chars().collect();
            let vowels: Vec<usize> = chars
                .iter()
                .enumerate()
                .filter(|(_, c)| is_vowel(**c))
                .map(|(i, _)| i)
                .collect();
            for &pos in vowels.iter().rev().take(2) {
                if let Some(acc) = accent(chars[pos]) {
                    let mut variant = chars.clone();
                    variant[pos] = acc;
                    extra.insert(variant.into_iter().collect());
                }
            }
        }
        candidates.extend(extra);
    }
}

/// Tratador apropriado para o idioma.
pub fn accent_handler(lang: &str) -> Box<dyn AccentHandler> {
    match lang {
        "es" => Box::new(SpanishAccents),
        _ => Box::new(DefaultAccents),
    }
}
