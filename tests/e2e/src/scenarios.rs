//! Overlay scenarios

pub mod binary_file_transfer;
pub mod relay_rejection;
pub mod remote_start;

pub use binary_file_transfer::BinaryFileTransferTest;
pub use relay_rejection::UnknownDestinationTest;
pub use remote_start::RemoteStartThroughRelayTest;

use crate::framework::TestScenario;

/// Every scenario the runner knows, in run order
pub fn all() -> Vec<Box<dyn TestScenario>> {
    vec![
        Box::new(RemoteStartThroughRelayTest::default()),
        Box::new(BinaryFileTransferTest::default()),
        Box::new(UnknownDestinationTest::default()),
    ]
}
