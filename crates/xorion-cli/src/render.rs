//! Plain-text rendering of explorer results.

use chrono::DateTime;
use xorion_core::{
    Block, ChainProperties, ConnectionState, NetworkMetrics, Transaction, TransactionActivity,
    TransactionDetail, TransferInfo, format_token_amount, group_thousands, shorten,
};

pub fn timestamp(ms: Option<u64>) -> String {
    ms.and_then(|ms| i64::try_from(ms).ok())
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn connection(state: &ConnectionState) -> String {
    let mut line = state.status.label().to_string();
    if let Some(endpoint) = &state.current_endpoint {
        line.push_str(&format!(" {}", endpoint));
    }
    if let Some(latency) = state.latency {
        line.push_str(&format!(" ({} ms)", latency.as_millis()));
    }
    if state.consecutive_attempts > 0 {
        line.push_str(&format!(" after {} failed attempts", state.consecutive_attempts));
    }
    if let Some(error) = &state.last_error {
        line.push_str(&format!(" | last error: {}", error));
    }
    line
}

pub fn metrics(m: &NetworkMetrics, properties: &ChainProperties) -> String {
    [
        format!("Finalized height   #{}", m.finalized_height),
        format!(
            "Validators         {}/{} online ({}% healthy)",
            m.validators_online, m.total_validators, m.network_health_percent
        ),
        format!(
            "Value locked       {} {}",
            group_thousands(&m.total_value_locked),
            properties.token_symbol
        ),
        format!("Staking APR        {:.2}%", m.staking_apr),
        format!("Block time         {:.2}s", m.avg_block_time_secs),
        format!(
            "Recent activity    {} transactions from {} addresses",
            m.total_transactions, m.active_addresses
        ),
    ]
    .join("\n")
}

pub fn block(b: &Block) -> String {
    format!(
        "#{:<10} {}  {:>3} ext  {:>6} B  {}  {}",
        b.height,
        shorten(&b.hash, 6),
        b.extrinsic_count,
        b.approximate_size_bytes,
        timestamp(b.timestamp_ms),
        b.proposer.as_deref().map(|p| shorten(p, 6)).unwrap_or_default()
    )
}

/// Non-native assets carry no decimals here, so they show raw units.
fn transfer_amount(transfer: &TransferInfo, properties: &ChainProperties) -> String {
    if transfer.asset_symbol == properties.token_symbol {
        format_token_amount(transfer.amount, properties)
    } else {
        format!(
            "{} {}",
            group_thousands(&transfer.amount.to_string()),
            transfer.asset_symbol
        )
    }
}

pub fn transaction(tx: &Transaction, properties: &ChainProperties) -> String {
    let status = if tx.success { "ok" } else { "FAILED" };
    let summary = match (&tx.transfer, tx.staking) {
        (Some(transfer), _) => format!(
            "{} -> {} {}",
            shorten(&transfer.from, 6),
            shorten(&transfer.to, 6),
            transfer_amount(transfer, properties)
        ),
        (None, Some(op)) => op.label().to_string(),
        (None, None) => tx.arg_summaries.join(", "),
    };
    format!(
        "#{}-{} {} {:<28} {:<6} {}",
        tx.block_number,
        tx.extrinsic_index,
        shorten(&tx.hash, 6),
        tx.call_label(),
        status,
        summary
    )
}

pub fn activity(a: &TransactionActivity, properties: &ChainProperties) -> String {
    let mut lines = vec![format!(
        "Finalized #{} | {} blocks | {} transactions",
        a.finalized_height,
        a.blocks.len(),
        a.transactions.len()
    )];
    lines.push(String::new());
    lines.push("Blocks".to_string());
    lines.extend(a.blocks.iter().map(block));
    lines.push(String::new());
    lines.push("Transactions".to_string());
    if a.transactions.is_empty() {
        lines.push("(none in window)".to_string());
    }
    lines.extend(a.transactions.iter().map(|tx| transaction(tx, properties)));
    lines.join("\n")
}

pub fn detail(d: &TransactionDetail, properties: &ChainProperties) -> String {
    let tx = &d.transaction;
    let mut lines = vec![
        format!("Hash        {}", tx.hash),
        format!("Block       #{} ({})", tx.block_number, tx.block_hash),
        format!("Index       {}", tx.extrinsic_index),
        format!("Call        {}", tx.call_label()),
        format!("Status      {}", if tx.success { "Success" } else { "Failed" }),
        format!("Time        {}", timestamp(tx.timestamp_ms)),
        format!("Signer      {}", tx.signer.as_deref().unwrap_or("(unsigned)")),
        format!("Fee         {}", format_token_amount(tx.fee, properties)),
    ];
    if let Some(nonce) = d.nonce {
        lines.push(format!("Nonce       {}", nonce));
    }
    if let Some(tip) = d.tip {
        lines.push(format!("Tip         {}", format_token_amount(tip, properties)));
    }
    if let Some(era) = d.era {
        lines.push(format!("Era         {}", era));
    }
    if let Some(signature) = &d.signature {
        lines.push(format!("Signature   {}", shorten(signature, 10)));
    }
    if let Some(transfer) = &tx.transfer {
        lines.push(format!(
            "Transfer    {} -> {} {}",
            transfer.from,
            transfer.to,
            transfer_amount(transfer, properties)
        ));
    }
    if !d.args.is_empty() {
        lines.push("Arguments".to_string());
        lines.extend(d.args.iter().map(|a| format!("  {}: {}", a.name, a.value)));
    }
    if !tx.events.is_empty() {
        lines.push("Events".to_string());
        lines.extend(
            tx.events
                .iter()
                .map(|e| format!("  {}.{} {}", e.pallet, e.variant, e.fields.join(", "))),
        );
    }
    lines.join("\n")
}
