pub mod chunker;

pub use chunker::{Chunker, PerCharTokenizer, Tokenizer};
