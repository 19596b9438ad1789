use crate::transaction::TransactionState;
use crate::RegistryError;
use pkd_schema::ExitKind;

pub fn validate_transition(
    from: TransactionState,
    to: TransactionState,
) -> Result<(), RegistryError> {
    let valid = matches!(
        (from, to),
        (TransactionState::Added, TransactionState::Committed)
            | (TransactionState::Committed, TransactionState::Running)
            | (
                TransactionState::Committed,
                TransactionState::Finished(ExitKind::Failed)
            )
            | (TransactionState::Running, TransactionState::Finished(_))
            | (
                TransactionState::Added | TransactionState::Finished(_),
                TransactionState::Removed
            )
    );

    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
