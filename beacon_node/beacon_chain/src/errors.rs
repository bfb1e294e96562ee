use crate::fork_choice::ForkChoiceError;
use crate::job_queue::QueueError;
use crate::store::StoreError;
use state_processing::{SignatureSetError, StateAdvanceError};
use types::BeaconStateError;

/// Internal failures of the chain itself, as opposed to problems with a block being imported.
#[derive(Debug)]
pub enum BeaconChainError {
    UnableToReadSlot,
    ForkChoiceError(ForkChoiceError),
    StoreError(StoreError),
    StateAdvanceError(StateAdvanceError),
    SignatureSetError(SignatureSetError),
    BeaconStateError(BeaconStateError),
    QueueError(QueueError),
}

macro_rules! easy_from_to {
    ($from: ident, $to: ident) => {
        impl From<$from> for $to {
            fn from(e: $from) -> $to {
                $to::$from(e)
            }
        }
    };
}

easy_from_to!(ForkChoiceError, BeaconChainError);
easy_from_to!(StoreError, BeaconChainError);
easy_from_to!(StateAdvanceError, BeaconChainError);
easy_from_to!(SignatureSetError, BeaconChainError);
easy_from_to!(BeaconStateError, BeaconChainError);
easy_from_to!(QueueError, BeaconChainError);
