//! Record validation rules

use crate::message::{MessageRecord, CURRENT_LIMIT, DELTA_LIMIT};
use crate::{CodecError, Result};
use types::AddressClass;

/// Check a record's counters against their bounds and its key against `class`
pub fn validate_record(record: &MessageRecord, class: AddressClass) -> Result<()> {
    if record.current >= CURRENT_LIMIT {
        return Err(CodecError::Validation(format!(
            "current {} out of range [0,{})",
            record.current, CURRENT_LIMIT
        )));
    }

    if record.delta >= DELTA_LIMIT {
        return Err(CodecError::Validation(format!(
            "delta {} out of range [0,{})",
            record.delta, DELTA_LIMIT
        )));
    }

    class.validate(&record.client_key)?;
    Ok(())
}
