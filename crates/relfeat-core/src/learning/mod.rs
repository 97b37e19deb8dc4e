pub mod backend;
pub mod svmlight;
