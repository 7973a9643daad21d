//! # pln-core: Pipeline de Processamento de Linguagem Natural
//!
//! Este crate analisa documentos em linguagem natural a partir de modelos em
//! arquivos texto pré-computados (dicionários, tabelas HMM, gramáticas, grafos de
//! sentidos). Nenhum modelo é treinado aqui.
//!
//! ## Arquitetura do Sistema
//!
//! O dado flui por um pipeline linear, sentença a sentença:
//!
//! 1.  **Tokenização** ([`tokenizer`]): regras regex com macros e abreviaturas, preservando offsets.
//! 2.  **Divisão em sentenças** ([`splitter`]): marcadores, finais ambíguos e sessões.
//! 3.  **Análise morfológica** ([`maco`]): pontuação, dicionário com afixos e contrações,
//!     locuções e nomes próprios, seguidos das probabilidades lexicais ([`probability`]).
//! 4.  **Etiquetagem** ([`hmm`]): HMM de trigramas com Viterbi k-best ([`viterbi`]).
//! 5.  **Sentidos** ([`senses`], [`ukb`]): candidatos do WordNet e PageRank personalizado.
//! 6.  **Análise sintática parcial** ([`grammar`], [`chart`]): chart parser com curingas,
//!     prioridades e elevação de nós ocultos.
//! 7.  **Saída** ([`document`]): tokens, árvores, triplas ([`wdw`]) e entidades.
//!
//! ## Exemplo de Uso
//!
//! ```rust,no_run
//! use pln_core::{DocumentInput, Engine, EngineOptions};
//!
//! fn main() -> pln_core::Result<()> {
//!     let options = EngineOptions::from_json_file("engine.json".as_ref())?;
//!     let engine = Engine::new(options)?;
//!     let doc = engine.analyze_document(DocumentInput::from_content("John Smith went to Paris."));
//!     println!("{}", doc.to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Módulos Principais
//!
//! - [`pipeline`]: o [`Engine`], que carrega os modelos e orquestra os estágios.
//! - [`language`] e [`parse_tree`]: palavras, análises, sentenças e árvores.
//! - [`config_file`]: leitor dos arquivos seccionados `<Secao>` ... `</Secao>`.
//! - [`logging`] e [`error`]: registro injetado e taxonomia de erros.

pub mod accents;
pub mod affixes;
pub mod automaton;
pub mod chart;
pub mod collaborators;
pub mod config_file;
pub mod database;
pub mod dictionary;
pub mod document;
pub mod error;
pub mod grammar;
pub mod hmm;
pub mod knowledge;
pub mod language;
pub mod locutions;
pub mod logging;
pub mod maco;
pub mod ner;
pub mod parse_tree;
pub mod pipeline;
pub mod probability;
pub mod punts;
pub mod semdb;
pub mod senses;
pub mod splitter;
pub mod tagset;
pub mod tokenizer;
pub mod ukb;
pub mod viterbi;
pub mod wdw;

pub use document::{DocumentInput, DocumentOutput, DocumentStatus, NamedEntity, SentenceOutput, TokenOutput};
pub use error::{PlnError, Result};
pub use language::{Analysis, Sentence, Word};
pub use logging::Logger;
pub use parse_tree::ParseTree;
pub use pipeline::{Engine, EngineOptions, PipelineEvent, SharedEngine};
