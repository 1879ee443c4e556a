pub mod cost;
pub mod grouping;
pub mod history;
pub mod pairing;
pub mod partition;
pub mod rules;

pub use cost::{CostModel, PairCosts, PairingMap};
pub use grouping::{GenerateSettings, GroupingService, HistoryCleared, SavedRound};
pub use history::{HistoryRecorder, RecordSummary};
pub use pairing::PairingHistory;
pub use partition::{AnnealingSchedule, PartitionRequest, Partitioner, SizePlan, Strategy};
pub use rules::RuleSet;
