//! Transfer and staking classification.
//!
//! Each matcher looks at one kind of evidence and either stays silent or
//! reports a finding. Findings are folded in order, so a confirmed event
//! overrides a guess from the call name, and a staking tag never marks the
//! extrinsic as a transfer.

use xorion_core::{ChainProperties, StakingOperation, TransferEventPolicy, TransferInfo};

use crate::rpc::{FieldValue, NamedField, RawEvent};
use crate::ss58::encode_ss58;

/// Pallets whose calls and events move fungible value.
const TRANSFER_PALLETS: &[&str] = &["balances", "currencies", "tokens", "assets"];
const TRANSFER_EVENTS: &[&str] = &["Transfer", "Transferred"];

/// One extrinsic plus the events it emitted.
pub struct ExtrinsicView<'a> {
    pub pallet: &'a str,
    pub method: &'a str,
    pub signer: Option<&'a [u8; 32]>,
    pub args: &'a [NamedField],
    pub events: &'a [&'a RawEvent],
    pub properties: &'a ChainProperties,
    pub policy: TransferEventPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvidence {
    /// Transfer-like call name on a value pallet.
    MethodGuess(TransferInfo),
    /// A Transfer event emitted by the extrinsic.
    EventConfirmed(TransferInfo),
    StakingTag(StakingOperation),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub transfer: Option<TransferInfo>,
    pub staking: Option<StakingOperation>,
}

type Matcher = fn(&ExtrinsicView<'_>) -> Option<TransferEvidence>;

/// Lowest priority first.
const MATCHERS: &[Matcher] = &[method_guess, event_confirmation, staking_tag];

pub fn classify(view: &ExtrinsicView<'_>) -> Classification {
    let mut result = Classification::default();
    for matcher in MATCHERS {
        match matcher(view) {
            Some(TransferEvidence::MethodGuess(info)) => result.transfer = Some(info),
            Some(TransferEvidence::EventConfirmed(info)) => result.transfer = Some(info),
            Some(TransferEvidence::StakingTag(op)) => result.staking = Some(op),
            None => {}
        }
    }
    result
}

fn is_transfer_pallet(pallet: &str) -> bool {
    let lower = pallet.to_ascii_lowercase();
    TRANSFER_PALLETS.contains(&lower.as_str())
}

fn asset_symbol(pallet: &str, properties: &ChainProperties) -> String {
    if pallet.eq_ignore_ascii_case("balances") {
        properties.token_symbol.clone()
    } else {
        pallet.to_string()
    }
}

fn render_party(value: &FieldValue, ss58_format: u16) -> String {
    match value.as_account() {
        Some(account) => encode_ss58(&account, ss58_format),
        None => value.render(ss58_format),
    }
}

fn method_guess(view: &ExtrinsicView<'_>) -> Option<TransferEvidence> {
    if !is_transfer_pallet(view.pallet) || !view.method.to_ascii_lowercase().contains("transfer") {
        return None;
    }
    let signer = view.signer?;
    let ss58 = view.properties.ss58_format;

    // Leading (recipient, amount) arguments; either may be missing.
    let to = view
        .args
        .first()
        .map(|f| render_party(&f.value, ss58))
        .unwrap_or_default();
    let amount = view
        .args
        .get(1)
        .and_then(|f| f.value.as_amount())
        .unwrap_or(0);

    Some(TransferEvidence::MethodGuess(TransferInfo {
        from: encode_ss58(signer, ss58),
        to,
        amount,
        asset_symbol: asset_symbol(view.pallet, view.properties),
    }))
}

fn event_confirmation(view: &ExtrinsicView<'_>) -> Option<TransferEvidence> {
    view.events
        .iter()
        .filter(|e| is_transfer_pallet(&e.pallet) && TRANSFER_EVENTS.contains(&e.variant.as_str()))
        .find_map(|event| {
            let info = match view.policy {
                TransferEventPolicy::Structural => structural_transfer(event, view.properties),
                TransferEventPolicy::Positional => positional_transfer(event, view.properties),
            };
            if info.is_none() {
                tracing::warn!(
                    "Ignoring {}.{} event with unexpected shape",
                    event.pallet,
                    event.variant
                );
            }
            info
        })
        .map(TransferEvidence::EventConfirmed)
}

/// Requires (account, account, amount) as the leading fields.
fn structural_transfer(event: &RawEvent, properties: &ChainProperties) -> Option<TransferInfo> {
    let from = event.fields.first()?.value.as_account()?;
    let to = event.fields.get(1)?.value.as_account()?;
    let amount = event.fields.get(2)?.value.as_amount()?;
    Some(TransferInfo {
        from: encode_ss58(&from, properties.ss58_format),
        to: encode_ss58(&to, properties.ss58_format),
        amount,
        asset_symbol: asset_symbol(&event.pallet, properties),
    })
}

/// Takes fields 0, 1 and 2 as (from, to, amount) whatever they hold.
fn positional_transfer(event: &RawEvent, properties: &ChainProperties) -> Option<TransferInfo> {
    if event.fields.len() < 3 {
        return None;
    }
    let ss58 = properties.ss58_format;
    Some(TransferInfo {
        from: render_party(&event.fields[0].value, ss58),
        to: render_party(&event.fields[1].value, ss58),
        amount: event.fields[2].value.as_amount().unwrap_or(0),
        asset_symbol: asset_symbol(&event.pallet, properties),
    })
}

fn staking_tag(view: &ExtrinsicView<'_>) -> Option<TransferEvidence> {
    let op = if view.pallet.eq_ignore_ascii_case("staking") {
        StakingOperation::from_staking_call(view.method)
    } else if view.pallet.eq_ignore_ascii_case("nominationpools") {
        StakingOperation::from_pool_call(view.method)
    } else {
        None
    }?;
    Some(TransferEvidence::StakingTag(op))
}
