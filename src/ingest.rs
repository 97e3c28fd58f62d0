use std::fmt;

use rand::Rng;

use crate::bulk::{bulk_body, BulkClient};
use crate::trade::TradeGenerator;

/// An inclusive range of trade indices sent in one bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub start: u64,
    pub end: u64,
}

impl BatchRange {
    /// Number of trades in the range. Never zero.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for BatchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Splits `start..=total` into consecutive ranges of at most `batch_size` indices. Yields
/// nothing when `start > total`.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    next: u64,
    total: u64,
    batch_size: u64,
}

impl BatchPlan {
    pub fn new(start: u64, total: u64, batch_size: u64) -> Self {
        Self {
            next: start.max(1),
            total,
            batch_size: batch_size.max(1),
        }
    }
}

impl Iterator for BatchPlan {
    type Item = BatchRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.total {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.batch_size - 1).min(self.total);
        // Once the last batch ends on u64::MAX there is no next index to resume from, so we
        // park `next` above `total` by shrinking `total` instead of overflowing.
        match end.checked_add(1) {
            Some(next) => self.next = next,
            None => {
                self.next = 1;
                self.total = 0;
            }
        }
        Some(BatchRange { start, end })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub batches: usize,
    pub inserted_batches: usize,
    pub failed_batches: usize,
    pub records: u64,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sent {} trades in {} batches, {} inserted, {} with errors",
            self.records, self.batches, self.inserted_batches, self.failed_batches
        )
    }
}

pub struct Ingester<R> {
    client: BulkClient,
    generator: TradeGenerator<R>,
    batch_size: u64,
}

impl<R: Rng> Ingester<R> {
    pub fn new(client: BulkClient, generator: TradeGenerator<R>, batch_size: u64) -> Self {
        Self {
            client,
            generator,
            batch_size,
        }
    }

    // Batches go out strictly one after the other: we only generate the next one once the
    // previous bulk call has returned, so at most one batch of trades lives in memory at a time.
    // A batch reporting errors (or rejected outright) is logged and skipped, never retried.
    // Transport failures abort the run with `?`. Since ids are derived from the index, whatever
    // was already sent stays in the index, and re-running with `--start` overwrites instead of
    // duplicating. The refresh is issued even when no batch was sent at all.
    pub async fn run(&mut self, start: u64, total: u64) -> anyhow::Result<IngestReport> {
        tracing::info!(
            "Ingesting trades {}..={} in batches of {}...",
            start,
            total,
            self.batch_size
        );
        let mut report = IngestReport::default();

        for batch in BatchPlan::new(start, total, self.batch_size) {
            let trades = self.generator.generate_batch(batch.start..=batch.end);
            let body = bulk_body(self.client.index(), &trades)?;
            let result = self.client.bulk(body).await?;

            report.batches += 1;
            report.records += batch.size();
            if result.errors {
                report.failed_batches += 1;
                tracing::warn!("Errors in batch {}", batch);
            } else {
                report.inserted_batches += 1;
                tracing::info!("Inserted trades {}", batch);
            }
        }

        self.client.refresh().await?;
        tracing::info!("Data ingestion complete! {}", report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::NDJSON;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ingester(server: &MockServer, batch_size: u64) -> Ingester<StdRng> {
        let client = BulkClient::new(&server.uri(), "trades").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        Ingester::new(client, TradeGenerator::seeded(5, today), batch_size)
    }

    async fn mount_bulk(server: &MockServer, errors: bool, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("content-type", NDJSON))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"errors": errors})),
            )
            .expect(calls)
            .mount(server)
            .await;
    }

    async fn mount_refresh(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/trades/_refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn bulk_bodies(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|request| request.url.path() == "/_bulk")
            .map(|request| String::from_utf8(request.body).unwrap())
            .collect()
    }

    fn ids(body: &str) -> Vec<String> {
        body.lines()
            .step_by(2)
            .map(|line| {
                let action: serde_json::Value = serde_json::from_str(line).unwrap();
                action["index"]["_id"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn plan_splits_remainder_into_last_batch() {
        let sut: Vec<_> = BatchPlan::new(1, 2500, 1000).collect();
        assert_eq!(
            sut,
            vec![
                BatchRange { start: 1, end: 1000 },
                BatchRange { start: 1001, end: 2000 },
                BatchRange { start: 2001, end: 2500 },
            ]
        );
        assert_eq!(sut.iter().map(BatchRange::size).collect::<Vec<_>>(), [1000u64, 1000, 500]);
    }

    #[test]
    fn plan_edges() {
        assert_eq!(BatchPlan::new(1, 0, 1000).count(), 0);
        assert_eq!(BatchPlan::new(1, 2000, 1000).count(), 2);
        assert_eq!(BatchPlan::new(1, 1, 1000).collect::<Vec<_>>(), [BatchRange { start: 1, end: 1 }]);
        assert_eq!(BatchPlan::new(9, 5, 1000).count(), 0);
        assert_eq!(
            BatchPlan::new(1501, 2500, 1000).collect::<Vec<_>>(),
            [BatchRange { start: 1501, end: 2500 }]
        );
        assert_eq!(BatchPlan::new(1, 3, 1).count(), 3);
    }

    #[test]
    fn plan_stops_at_the_largest_index() {
        let sut: Vec<_> = BatchPlan::new(u64::MAX - 1499, u64::MAX, 1000).collect();
        assert_eq!(
            sut,
            vec![
                BatchRange { start: u64::MAX - 1499, end: u64::MAX - 500 },
                BatchRange { start: u64::MAX - 499, end: u64::MAX },
            ]
        );

        let mut sut = BatchPlan::new(u64::MAX, u64::MAX, 1000);
        assert_eq!(sut.next(), Some(BatchRange { start: u64::MAX, end: u64::MAX }));
        assert_eq!(sut.next(), None);
        assert_eq!(sut.next(), None);
    }

    #[test]
    fn range_displays_inclusive_bounds() {
        assert_eq!(BatchRange { start: 2001, end: 2500 }.to_string(), "2001-2500");
    }

    #[tokio::test]
    async fn sends_one_bulk_request_per_batch_then_refreshes() {
        let server = MockServer::start().await;
        mount_bulk(&server, false, 3).await;
        mount_refresh(&server).await;

        let report = ingester(&server, 1000).run(1, 2500).await.unwrap();
        assert_eq!(
            report,
            IngestReport {
                batches: 3,
                inserted_batches: 3,
                failed_batches: 0,
                records: 2500,
            }
        );

        let bodies = bulk_bodies(&server).await;
        let line_counts: Vec<_> = bodies.iter().map(|body| body.lines().count()).collect();
        assert_eq!(line_counts, [2000usize, 2000, 1000]);
        assert_eq!(ids(&bodies[0]).first().unwrap(), "TRD000001");
        assert_eq!(ids(&bodies[2]).last().unwrap(), "TRD002500");

        let last = server.received_requests().await.unwrap().pop().unwrap();
        assert_eq!(last.url.path(), "/trades/_refresh");
    }

    #[tokio::test]
    async fn zero_trades_still_refreshes() {
        let server = MockServer::start().await;
        mount_bulk(&server, false, 0).await;
        mount_refresh(&server).await;

        let report = ingester(&server, 1000).run(1, 0).await.unwrap();
        assert_eq!(report, IngestReport::default());
    }

    #[tokio::test]
    async fn failed_batches_do_not_stop_the_run() {
        let server = MockServer::start().await;
        mount_bulk(&server, true, 3).await;
        mount_refresh(&server).await;

        let report = ingester(&server, 10).run(1, 25).await.unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.failed_batches, 3);
        assert_eq!(report.inserted_batches, 0);
    }

    #[tokio::test]
    async fn rejected_batches_without_body_do_not_stop_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(413))
            .expect(3)
            .mount(&server)
            .await;
        mount_refresh(&server).await;

        let report = ingester(&server, 10).run(1, 25).await.unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.failed_batches, 3);
        assert_eq!(report.records, 25);

        let last = server.received_requests().await.unwrap().pop().unwrap();
        assert_eq!(last.url.path(), "/trades/_refresh");
    }

    #[tokio::test]
    async fn reingesting_a_range_reuses_the_same_ids() {
        let server = MockServer::start().await;
        mount_bulk(&server, false, 4).await;
        Mock::given(method("POST"))
            .and(path("/trades/_refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        ingester(&server, 100).run(1, 150).await.unwrap();
        ingester(&server, 100).run(1, 150).await.unwrap();

        let bodies = bulk_bodies(&server).await;
        assert_eq!(bodies.len(), 4);
        let first: Vec<_> = bodies[..2].iter().flat_map(|body| ids(body)).collect();
        let second: Vec<_> = bodies[2..].iter().flat_map(|body| ids(body)).collect();
        assert_eq!(first.len(), 150);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn start_index_resumes_mid_range() {
        let server = MockServer::start().await;
        mount_bulk(&server, false, 1).await;
        mount_refresh(&server).await;

        let report = ingester(&server, 1000).run(2001, 2500).await.unwrap();
        assert_eq!(report.records, 500);

        let bodies = bulk_bodies(&server).await;
        let ids = ids(&bodies[0]);
        assert_eq!(ids.first().unwrap(), "TRD002001");
        assert_eq!(ids.len(), 500);
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_run() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = BulkClient::new(&url, "trades").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut sut = Ingester::new(client, TradeGenerator::seeded(5, today), 10);
        assert!(sut.run(1, 5).await.is_err());
    }
}
