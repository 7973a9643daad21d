//! # Base Léxica Chave → Texto
//!
//! Mapas simples carregados de arquivos texto, usados para dicionários,
//! pontuação e inventários de sentidos. O arquivo começa com o tipo de índice:
//!
//! ```text
//! DB_MAP
//! , , Fc
//! . . Fp
//! ```
//!
//! Chaves repetidas acumulam os dados separados por espaço.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{read_model_file, Result};

/// Tipo de índice da base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexType {
    /// Tabela hash: só acesso exato.
    #[default]
    Map,
    /// Índice ordenado: acesso exato e busca por prefixo.
    PrefTree,
}

impl IndexType {
    /// Interpreta `DB_MAP` / `DB_PREFTREE`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "DB_MAP" => Some(IndexType::Map),
            "DB_PREFTREE" => Some(IndexType::PrefTree),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Storage {
    Map(HashMap<String, String>),
    Tree(BTreeMap<String, String>),
}

/// Base chave → dados.
#[derive(Debug, Clone)]
pub struct Database {
    storage: Storage,
}

impl Database {
    pub fn new(index: IndexType) -> Self {
        let storage = match index {
            IndexType::Map => Storage::Map(HashMap::new()),
            IndexType::PrefTree => Storage::Tree(BTreeMap::new()),
        };
        Self { storage }
    }

    /// Carrega de um arquivo (`DB_MAP`/`DB_PREFTREE` na primeira linha).
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = read_model_file(path)?;
        Ok(Self::from_text(&text))
    }

    /// Carrega do conteúdo de um arquivo. Sem cabeçalho reconhecido, assume `DB_MAP`
    /// e trata a primeira linha como entrada.
    pub fn from_text(text: &str) -> Self {
        let mut lines = text.lines().peekable();
        let index = lines.peek().and_then(|l| IndexType::parse(l));
        if index.is_some() {
            lines.next();
        }
        let mut db = Self::new(index.unwrap_or_default());
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_once(char::is_whitespace) {
                Some((key, data)) => db.add(key, data.trim()),
                None => db.add(line, ""),
            }
        }
        db
    }

    pub fn index_type(&self) -> IndexType {
        match self.storage {
            Storage::Map(_) => IndexType::Map,
            Storage::Tree(_) => IndexType::PrefTree,
        }
    }

    /// Adiciona dados à chave. Se já existir, concatena com um espaço.
    pub fn add(&mut self, key: &str, data: &str) {
        let slot = match &mut self.storage {
            Storage::Map(m) => m.entry(key.to_string()).or_default(),
            Storage::Tree(t) => t.entry(key.to_string()).or_default(),
        };
        if slot.is_empty() {
            slot.push_str(data);
        } else if !data.is_empty() {
            slot.push(' ');
            slot.push_str(data);
        }
    }

    /// Dados da chave, ou string vazia se não existir.
    pub fn access(&self, key: &str) -> &str {
        let found = match &self.storage {
            Storage::Map(m) => m.get(key),
            Storage::Tree(t) => t.get(key),
        };
        found.map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        match &self.storage {
            Storage::Map(m) => m.contains_key(key),
            Storage::Tree(t) => t.contains_key(key),
        }
    }

    /// Todas as entradas cuja chave começa com `prefix`, em ordem.
    /// Em bases `DB_MAP` a busca é linear e o resultado também é ordenado.
    pub fn prefix_search(&self, prefix: &str) -> Vec<(&str, &str)> {
        match &self.storage {
            Storage::Tree(t) => t
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            Storage::Map(m) => {
                let mut out: Vec<(&str, &str)> = m
                    .iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                out.sort();
                out
            }
        }
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Map(m) => m.len(),
            Storage::Tree(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(IndexType::Map)
    }
}
