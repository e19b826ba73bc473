//! Turning raw blocks and events into explorer records.

use xorion_core::{
    Block, ChainProperties, DecodedArg, DecodedEvent, Transaction, TransactionDetail,
    TransferEventPolicy,
};

use crate::rpc::{AccountBytes, EventPhase, RawBlock, RawEvent, RawExtrinsic};
use crate::ss58::{encode_ss58, hex_hash};

use super::fee::fee_from_events;
use super::transfer::{ExtrinsicView, classify};

/// Wall-clock time from the block's `Timestamp.set` inherent.
pub fn block_timestamp(block: &RawBlock) -> Option<u64> {
    block
        .extrinsics
        .iter()
        .find(|e| e.pallet.eq_ignore_ascii_case("timestamp") && e.call == "set")
        .and_then(|e| e.arg("now").or_else(|| e.args.first().map(|f| &f.value)))
        .and_then(|v| v.as_amount())
        .map(|now| now as u64)
}

/// Events applied at extrinsic `index`.
pub fn events_for(events: &[RawEvent], index: u32) -> Vec<&RawEvent> {
    events
        .iter()
        .filter(|e| e.phase == EventPhase::ApplyExtrinsic(index))
        .collect()
}

pub fn is_success(events: &[&RawEvent]) -> bool {
    !events.iter().any(|e| e.is("System", "ExtrinsicFailed"))
}

pub fn block_summary(
    block: &RawBlock,
    timestamp_ms: Option<u64>,
    proposer: Option<&AccountBytes>,
    properties: &ChainProperties,
) -> Block {
    Block {
        height: block.header.number,
        hash: block.hash_hex(),
        timestamp_ms,
        extrinsic_count: block.extrinsics.len() as u32,
        proposer: proposer.map(|a| encode_ss58(a, properties.ss58_format)),
        approximate_size_bytes: block.approximate_size(),
    }
}

/// Shared context for every extrinsic of one block.
pub struct BlockContext<'a> {
    pub block: &'a RawBlock,
    pub events: &'a [RawEvent],
    pub timestamp_ms: Option<u64>,
    pub properties: &'a ChainProperties,
    pub policy: TransferEventPolicy,
}

impl BlockContext<'_> {
    pub fn transaction(&self, ext: &RawExtrinsic) -> Transaction {
        let ss58 = self.properties.ss58_format;
        let events = events_for(self.events, ext.index);
        let classification = classify(&ExtrinsicView {
            pallet: &ext.pallet,
            method: &ext.call,
            signer: ext.signer.as_ref(),
            args: &ext.args,
            events: &events,
            properties: self.properties,
            policy: self.policy,
        });

        Transaction {
            hash: hex_hash(&ext.hash),
            block_number: self.block.header.number,
            block_hash: self.block.hash_hex(),
            extrinsic_index: ext.index,
            pallet: ext.pallet.clone(),
            method: ext.call.clone(),
            signer: ext.signer.as_ref().map(|s| encode_ss58(s, ss58)),
            timestamp_ms: self.timestamp_ms,
            success: is_success(&events),
            fee: fee_from_events(&events),
            arg_summaries: ext
                .args
                .iter()
                .map(|f| match &f.name {
                    Some(name) => format!("{}: {}", name, f.value.render(ss58)),
                    None => f.value.render(ss58),
                })
                .collect(),
            transfer: classification.transfer,
            staking: classification.staking,
            events: events
                .iter()
                .map(|e| DecodedEvent {
                    pallet: e.pallet.clone(),
                    variant: e.variant.clone(),
                    fields: e.fields.iter().map(|f| f.value.render(ss58)).collect(),
                })
                .collect(),
        }
    }

    pub fn detail(&self, ext: &RawExtrinsic) -> TransactionDetail {
        let ss58 = self.properties.ss58_format;
        TransactionDetail {
            transaction: self.transaction(ext),
            nonce: ext.nonce,
            tip: ext.tip,
            era: ext.era,
            signature: ext.signature.as_ref().map(|s| format!("0x{}", hex::encode(s))),
            args: ext
                .args
                .iter()
                .enumerate()
                .map(|(i, f)| DecodedArg {
                    name: f.name.clone().unwrap_or_else(|| format!("arg{}", i)),
                    value: f.value.render(ss58),
                })
                .collect(),
            is_decoded: true,
        }
    }
}
