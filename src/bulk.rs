use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::trade::TradeRecord;

pub const NDJSON: &str = "application/x-ndjson";

#[derive(Serialize)]
struct Action<'a> {
    index: Target<'a>,
}

#[derive(Serialize)]
struct Target<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
}

/// Frames `trades` as a bulk request: an `index` action line followed by the document line for
/// every trade, newline separated and newline terminated.
pub fn bulk_body(index: &str, trades: &[TradeRecord]) -> anyhow::Result<String> {
    let mut lines = Vec::with_capacity(trades.len() * 2);
    for trade in trades {
        let action = Action {
            index: Target {
                index,
                id: &trade.trade_id,
            },
        };
        lines.push(serde_json::to_string(&action)?);
        lines.push(serde_json::to_string(trade)?);
    }
    let mut body = lines.join("\n");
    body.push('\n');
    Ok(body)
}

/// The part of the bulk response we look at. Item-level results are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
}

/// Thin wrapper over the two search index endpoints the ingester talks to. No timeouts are
/// set, so a hung request stalls the caller.
pub struct BulkClient {
    http: reqwest::Client,
    es_url: String,
    index: String,
}

impl BulkClient {
    pub fn new(es_url: &str, index: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Error building HTTP client")?;
        Ok(Self {
            http,
            es_url: es_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub async fn bulk(&self, body: String) -> anyhow::Result<BulkResponse> {
        let url = format!("{}/_bulk", self.es_url);
        tracing::debug!("POST {} [bytes={}]", url, body.len());
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, NDJSON)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Error sending bulk request to {}", url))?;

        // A rejected request never carries the `errors` flag. Its body may be an `error` object,
        // a proxy's HTML page or nothing at all (a 413 for an oversized batch), so we don't try
        // to decode it and report the whole batch as failed instead.
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Bulk request rejected [status={}]: {}", status, body);
            return Ok(BulkResponse { errors: true });
        }

        response
            .json()
            .await
            .context("Error decoding bulk response")
    }

    pub async fn refresh(&self) -> anyhow::Result<()> {
        let url = format!("{}/{}/_refresh", self.es_url, self.index);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("Error refreshing index at {}", url))?;
        tracing::debug!("Index refreshed [status={}]", response.status());
        Ok(())
    }
}
