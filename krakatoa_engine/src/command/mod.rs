/// Command recording and submission

pub mod ownership_transfer;
pub mod command_submission_manager;

pub use ownership_transfer::OwnershipTransfer;
pub use command_submission_manager::CommandSubmissionManager;
