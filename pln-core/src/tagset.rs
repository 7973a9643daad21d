//! # Tagset: Tags Curtas e Traços Morfológicos
//!
//! Reduz tags completas (ex: `NCMS000`) à forma curta usada nas estatísticas do
//! HMM e da atribuição de probabilidades (ex: `NC`).
//!
//! ```text
//! <DirectTranslations>
//! Fc Fc punct=comma
//! </DirectTranslations>
//! <DecompositionRules>
//! N 2 noun type/C:common;P:proper gen/M:masc;F:fem
//! V 0,2 verb
//! </DecompositionRules>
//! ```

use std::collections::HashMap;
use std::path::Path;

use crate::config_file::ConfigFile;
use crate::error::{read_model_file, Result};
use crate::logging::Logger;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Direct,
    Decomposition,
}

#[derive(Debug, Clone, Default)]
struct Decomposition {
    sizes: Vec<usize>,
    pos_name: Option<String>,
    /// Traço de cada posição (1-based) da tag: nome e mapa código → valor.
    features: Vec<(String, HashMap<char, String>)>,
}

/// Tabela de tags curtas.
#[derive(Debug, Clone)]
pub struct TagSet {
    direct: HashMap<String, (String, String)>,
    rules: HashMap<char, Decomposition>,
    log: Logger,
}

impl TagSet {
    pub fn from_file(path: &Path, log: Logger) -> Result<Self> {
        let text = read_model_file(path)?;
        Self::from_text(&path.display().to_string(), &text, log)
    }

    pub fn from_text(name: &str, text: &str, log: Logger) -> Result<Self> {
        let mut cfg = ConfigFile::from_text(name, text, false, log.clone())
            .with_section("DirectTranslations", Section::Direct)
            .with_section("DecompositionRules", Section::Decomposition);

        let mut direct = HashMap::new();
        let mut rules = HashMap::new();
        while let Some(line) = cfg.next_line()? {
            let items = line.fields();
            match line.section {
                Section::Direct => {
                    if items.len() < 2 {
                        log.warn(format!("{name}:{}: bad direct translation '{}'", line.line, line.text));
                        continue;
                    }
                    let msd = items.get(2).copied().unwrap_or("");
                    direct.insert(items[0].to_string(), (items[1].to_string(), msd.to_string()));
                }
                Section::Decomposition => {
                    let Some(cat) = items.first().and_then(|c| c.chars().next()) else {
                        continue;
                    };
                    let Some(sizes) = items.get(1) else {
                        log.warn(format!("{name}:{}: decomposition rule without sizes", line.line));
                        continue;
                    };
                    let sizes: Vec<usize> = sizes.split(',').filter_map(|s| s.parse().ok()).collect();
                    let features = items
                        .iter()
                        .skip(3)
                        .filter_map(|f| parse_feature(f))
                        .collect();
                    rules.insert(
                        cat,
                        Decomposition {
                            sizes,
                            pos_name: items.get(2).map(|s| s.to_string()),
                            features,
                        },
                    );
                }
            }
        }
        log.debug("tagset loaded");
        Ok(Self { direct, rules, log })
    }

    /// Versão curta de `tag`. Sem regra aplicável, avisa e devolve a própria tag.
    pub fn short_tag(&self, tag: &str) -> String {
        if let Some((short, _)) = self.direct.get(tag) {
            return short.clone();
        }
        let rule = tag.chars().next().and_then(|c| self.rules.get(&c));
        if let Some(rule) = rule {
            let chars: Vec<char> = tag.chars().collect();
            if let [n] = rule.sizes.as_slice() {
                return if *n == 0 || *n >= chars.len() {
                    tag.to_string()
                } else {
                    chars[..*n].iter().collect()
                };
            }
            let mut short = String::new();
            for &pos in &rule.sizes {
                match chars.get(pos) {
                    Some(c) => short.push(*c),
                    None => {
                        self.log
                            .warn(format!("tag {tag} too short for requested digits, unchanged"));
                        return tag.to_string();
                    }
                }
            }
            return short;
        }
        self.log.warn(format!("no rule to get short version of tag '{tag}'"));
        tag.to_string()
    }

    /// Traços `(nome, valor)` da tag: o MSD da tradução direta (`a=b|c=d`) ou,
    /// via regra de decomposição, a categoria seguida dos traços posicionais.
    pub fn msd_features(&self, tag: &str) -> Vec<(String, String)> {
        if let Some((_, msd)) = self.direct.get(tag) {
            return msd
                .split('|')
                .filter_map(|p| p.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
        let mut chars = tag.chars();
        let Some(rule) = chars.next().and_then(|c| self.rules.get(&c)) else {
            return vec![];
        };
        let mut out = vec![];
        if let Some(pos) = &rule.pos_name {
            out.push(("pos".to_string(), pos.clone()));
        }
        for ((name, values), c) in rule.features.iter().zip(chars) {
            if let Some(v) = values.get(&c.to_ascii_uppercase()) {
                out.push((name.clone(), v.clone()));
            }
        }
        out
    }
}

/// `gen/M:masc;F:fem` → (`gen`, {M: masc, F: fem}).
fn parse_feature(pattern: &str) -> Option<(String, HashMap<char, String>)> {
    let (name, values) = pattern.split_once('/')?;
    let map = values
        .split(';')
        .filter_map(|v| v.split_once(':'))
        .filter_map(|(code, val)| Some((code.chars().next()?.to_ascii_uppercase(), val.to_string())))
        .collect();
    Some((name.to_string(), map))
}
