mod pipeline;

pub use pipeline::{Options, Outcome, load_config, run};
