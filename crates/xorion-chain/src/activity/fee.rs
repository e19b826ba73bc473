//! Fee extraction from extrinsic events.

use xorion_core::Balance;

use crate::rpc::RawEvent;

/// Fee paid by an extrinsic, 0 when no fee event is present.
///
/// `TransactionPayment.TransactionFeePaid { who, actual_fee, tip }` wins;
/// otherwise the amount of a `Balances.Withdraw` is used.
pub fn fee_from_events(events: &[&RawEvent]) -> Balance {
    if let Some(event) = events
        .iter()
        .find(|e| e.is("TransactionPayment", "TransactionFeePaid"))
    {
        let fee = event
            .field("actual_fee")
            .or_else(|| event.fields.get(1).map(|f| &f.value))
            .and_then(|v| v.as_amount());
        if let Some(fee) = fee {
            return fee;
        }
    }

    events
        .iter()
        .find(|e| e.is("Balances", "Withdraw"))
        .and_then(|e| e.fields.last())
        .and_then(|f| f.value.as_amount())
        .unwrap_or(0)
}
