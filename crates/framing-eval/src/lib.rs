pub mod output;
pub mod pairs;
pub mod record;
pub mod report;
pub mod runner;

pub mod prelude {
    pub use crate::output::{BatchArtifacts, BatchDocument, BatchMetadata, read_csv, read_json};
    pub use crate::pairs::{PromptPair, PromptPairSet, load};
    pub use crate::record::{ERROR_PREFIX, FramingType, ResultRecord};
    pub use crate::report::EvalReport;
    pub use crate::runner::{EvalRunner, RunState};
}
