//! Serviços externos consumidos pelo motor: extração de artigos a partir de
//! uma URL, reconhecimento de entidades sobre o texto e glosas por palavra.
//!
//! O núcleo só conhece estas interfaces. Nenhuma implementação concreta vive
//! aqui.

use serde::{Deserialize, Serialize};

use crate::document::{GlossAnnotation, NamedEntity};
use crate::error::Result;

/// Conteúdo extraído de uma página.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub top_image: String,
    pub cleaned_text: String,
}

pub trait ArticleFetcher: Send + Sync {
    /// Baixa e limpa a página. Um erro aborta o documento.
    fn fetch(&self, url: &str) -> Result<Article>;
}

pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<NamedEntity>;
}

pub trait GlossAnnotator: Send + Sync {
    /// Glosas para a forma com a etiqueta dada; só enriquece a saída.
    fn annotate(&self, form: &str, tag: &str) -> Vec<GlossAnnotation>;
}
