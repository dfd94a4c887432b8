pub mod generate;
pub mod pipeline;
pub mod state;

pub use pipeline::{
    Analysis, AnalyzeRequest, Answer, ApplyRequest, FetchRequest, Generated, Pipeline, RunReport,
    Validation,
};
pub use state::{RunState, Stage, StageRecord};
