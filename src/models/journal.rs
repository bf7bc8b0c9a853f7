//! Journal entry: the external trade record format (§6.5).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalAssetType {
    Stock,
    Option,
    Future,
    Forex,
    Crypto,
}

impl JournalAssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalAssetType::Stock => "Stock",
            JournalAssetType::Option => "Option",
            JournalAssetType::Future => "Future",
            JournalAssetType::Forex => "Forex",
            JournalAssetType::Crypto => "Crypto",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalTradeRecord {
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "T/D")]
    pub trade_date: String,
    #[serde(rename = "S/D")]
    pub settlement_date: String,
    #[serde(rename = "Currency")]
    pub currency: String,
    #[serde(rename = "Type")]
    pub asset_type: String,
    #[serde(rename = "Side")]
    pub side: String,
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Qty")]
    pub qty: u32,
    #[serde(rename = "Price")]
    pub price: Decimal,
    #[serde(rename = "Exec Time")]
    pub exec_time: String,
    #[serde(rename = "Gross Proceeds")]
    pub gross_proceeds: Decimal,
    #[serde(rename = "Commissions & Fees")]
    pub commissions_and_fees: Decimal,
    #[serde(rename = "Net Proceeds")]
    pub net_proceeds: Decimal,
    #[serde(rename = "Expiration Date", skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(rename = "Strike", skip_serializing_if = "Option::is_none")]
    pub strike: Option<Decimal>,
    #[serde(rename = "Strategy", skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(rename = "Notes", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "Tags", skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(rename = "Paper Trade")]
    pub paper_trade: String,
    #[serde(rename = "Trade ID")]
    pub trade_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalUploadPayload {
    pub data: Vec<JournalTradeRecord>,
    #[serde(rename = "selectedBroker")]
    pub selected_broker: String,
    #[serde(rename = "uploadMfePrices")]
    pub upload_mfe_prices: bool,
    #[serde(rename = "appId")]
    pub app_id: String,
    #[serde(rename = "masterKey")]
    pub master_key: String,
}

/// A trade pending upload; the unit the journal queue enqueues and dedups on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTrade {
    pub trade_id: String,
    pub record: JournalTradeRecord,
    pub enqueued_at: DateTime<Utc>,
}
