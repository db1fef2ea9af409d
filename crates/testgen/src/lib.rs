//! Random history generation for exercising the checker.

pub mod generator;

pub use generator::{
    generate_list_append_history, generate_mult_histories, generate_register_history, GenParams,
    GeneratedHistory,
};
