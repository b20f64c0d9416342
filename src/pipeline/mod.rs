pub mod editing;
