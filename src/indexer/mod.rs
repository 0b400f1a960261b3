pub mod block_processor;
pub mod rpc;
pub mod transformations;

use alloy_primitives::FixedBytes;
use futures::StreamExt;
use futures::future::join_all;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, Receiver, Sender, WeakSender};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::indexer::block_processor::BlockProcessor;
use crate::indexer::rpc::{ChainNode, FeedStream, TraceOptions};
use crate::metrics::Metrics;
use crate::models::common::IndexerConfig;
use crate::models::datasets::blocks::HeadEvent;
use crate::models::datasets::logs::RpcLogData;
use crate::models::datasets::transfers::TransferRecord;
use crate::models::errors::{PipelineError, SinkError};
use crate::storage::Sink;
use crate::storage::checkpoint::{CheckpointStore, ContiguousCheckpoint};
use crate::utils::retry::next_delay;

const HEADS_FEED: &str = "newHeads";
const PENDING_FEED: &str = "newPendingTransactions";
const REMOVED_LOGS_FEED: &str = "logs";

/// Ingestion pipeline: backlog catch-up, then live following of the chain.
///
/// Cheap to clone; every clone shares the same node, sink and checkpoint.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<IndexerConfig>,
    node: Arc<dyn ChainNode>,
    processor: Arc<BlockProcessor>,
    sink: Arc<Sink>,
    checkpoint: Arc<CheckpointStore>,
    tracker: Arc<Mutex<ContiguousCheckpoint>>,
    metrics: Option<Arc<Metrics>>,
}

struct Queues {
    blocks: Sender<u64>,
    pending_txs: Sender<FixedBytes<32>>,
    removed_logs: Sender<RpcLogData>,
}

// Weak handles so reporting never keeps a queue open
enum DepthGauge {
    Block(WeakSender<u64>),
    Hash(WeakSender<FixedBytes<32>>),
    Head(WeakSender<HeadEvent>),
    Log(WeakSender<RpcLogData>),
}

impl DepthGauge {
    fn depth(&self) -> Option<usize> {
        fn used<T>(sender: Sender<T>) -> usize {
            sender.max_capacity() - sender.capacity()
        }
        match self {
            DepthGauge::Block(weak) => weak.upgrade().map(used),
            DepthGauge::Hash(weak) => weak.upgrade().map(used),
            DepthGauge::Head(weak) => weak.upgrade().map(used),
            DepthGauge::Log(weak) => weak.upgrade().map(used),
        }
    }
}

type QueueGauges = Arc<StdMutex<Vec<(&'static str, DepthGauge)>>>;

enum Enqueued {
    Done,
    Shutdown,
    Closed,
}

impl Pipeline {
    pub fn new(
        config: Arc<IndexerConfig>,
        node: Arc<dyn ChainNode>,
        sink: Sink,
        checkpoint: CheckpointStore,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let trace_options = TraceOptions {
            timeout: Duration::from_secs(config.trace.timeout_secs),
            reexec: config.trace.reexec,
        };
        let processor = BlockProcessor::new(node.clone(), trace_options, metrics.clone());

        Self {
            config,
            node,
            processor: Arc::new(processor),
            sink: Arc::new(sink),
            checkpoint: Arc::new(checkpoint),
            tracker: Arc::new(Mutex::new(ContiguousCheckpoint::new(0))),
            metrics,
        }
    }

    /// First block to process. The last completed block is processed again, never skipped.
    ///
    /// A configured `start_block` below the stored checkpoint rewinds processing only; the
    /// persisted checkpoint holds until processing passes it again.
    pub fn resume_point(&self) -> u64 {
        let stored = self.checkpoint.get_last_block();
        match self.config.start_block {
            Some(start_block) => {
                if start_block < stored {
                    warn!(
                        "Configured block {} is below checkpoint {}, reprocessing without rewind",
                        start_block, stored
                    );
                } else {
                    info!("Starting from configured block {}", start_block);
                }
                start_block
            }
            None => stored,
        }
    }

    /// Run until shutdown (`Ok`) or until a live feed fails (`FeedFailed`).
    ///
    /// A shutdown is any message on `shutdown`, or its sender being dropped. Queued blocks
    /// are drained before returning in both cases.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), PipelineError> {
        let resume = self.resume_point();
        *self.tracker.lock().await = ContiguousCheckpoint::new(resume);
        info!("Resuming from block {}", resume);

        let queue_sizes = &self.config.queues;
        let (blocks_tx, blocks_rx) = mpsc::channel::<u64>(queue_sizes.blocks.max(1));
        let (pending_tx, pending_rx) = mpsc::channel(queue_sizes.pending_txs.max(1));
        let (removed_tx, removed_rx) = mpsc::channel(queue_sizes.removed_logs.max(1));

        let gauges: QueueGauges = Arc::new(StdMutex::new(vec![
            ("blocks", DepthGauge::Block(blocks_tx.downgrade())),
            ("pending_txs", DepthGauge::Hash(pending_tx.downgrade())),
            ("removed_logs", DepthGauge::Log(removed_tx.downgrade())),
        ]));
        let reporter = self.spawn_reporter(gauges.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let workers = self.spawn_workers(blocks_rx, pending_rx, removed_rx, stop_rx);
        let queues = Queues {
            blocks: blocks_tx,
            pending_txs: pending_tx,
            removed_logs: removed_tx,
        };

        let outcome = self.ingest(resume, &queues, &gauges, &mut shutdown).await;

        // Failing blocks stop retrying; queued blocks still get processed
        let _ = stop_tx.send(true);
        reporter.abort();
        let _ = reporter.await;

        // Closing the queues lets every worker finish what is already queued
        drop(queues);
        join_all(workers).await;

        match &outcome {
            Ok(()) => info!("Pipeline stopped"),
            Err(e) => error!("Pipeline stopped: {}", e),
        }
        outcome
    }

    async fn ingest(
        &self,
        resume: u64,
        queues: &Queues,
        gauges: &QueueGauges,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), PipelineError> {
        // Catch-up: everything up to and including the current head
        let head = self.node.current_block_number().await?;
        self.record_chain_tip(head);
        info!("Catching up from block {} to head {}", resume, head);

        let mut next_block = resume;
        match self
            .enqueue_blocks(&queues.blocks, &mut next_block, head, shutdown)
            .await
        {
            Enqueued::Done => {}
            Enqueued::Shutdown | Enqueued::Closed => return Ok(()),
        }

        // Live
        let heads = self.node.subscribe_heads().await?;
        let pending = self.node.subscribe_pending_transactions().await?;
        let removed = self.node.subscribe_removed_logs().await?;
        info!(
            "Subscribed to live feeds, following the chain from block {}",
            next_block
        );

        let events = &self.config.queues;
        let (head_events_tx, mut head_events) = mpsc::channel(events.head_events.max(1));
        let (tx_events_tx, tx_events) = mpsc::channel(events.new_tx_events.max(1));
        let (log_events_tx, log_events) = mpsc::channel(events.removed_log_events.max(1));

        if let Ok(mut gauges) = gauges.lock() {
            gauges.extend([
                ("head_events", DepthGauge::Head(head_events_tx.downgrade())),
                ("new_tx_events", DepthGauge::Hash(tx_events_tx.downgrade())),
                ("removed_log_events", DepthGauge::Log(log_events_tx.downgrade())),
            ]);
        }

        // Pending hashes and removed logs are relayed straight to their workers, so a slow
        // worker only holds back its own feed, never new heads
        let (failed_tx, mut failed_feeds) = mpsc::channel(2);
        let tasks = [
            tokio::spawn(pump(HEADS_FEED, heads, head_events_tx)),
            tokio::spawn(pump(PENDING_FEED, pending, tx_events_tx)),
            tokio::spawn(pump(REMOVED_LOGS_FEED, removed, log_events_tx)),
            tokio::spawn(relay(
                PENDING_FEED,
                tx_events,
                queues.pending_txs.clone(),
                failed_tx.clone(),
            )),
            tokio::spawn(relay(
                REMOVED_LOGS_FEED,
                log_events,
                queues.removed_logs.clone(),
                failed_tx,
            )),
        ];

        let live = loop {
            tokio::select! {
                _ = shutdown.recv() => break Ok(()),
                head = head_events.recv() => {
                    let Some(head) = head else {
                        break Err(PipelineError::FeedFailed(HEADS_FEED));
                    };
                    self.record_chain_tip(head.number);
                    debug!("New head {} ({})", head.number, head.hash);
                    match self
                        .enqueue_blocks(&queues.blocks, &mut next_block, head.number, shutdown)
                        .await
                    {
                        Enqueued::Done => {}
                        Enqueued::Shutdown | Enqueued::Closed => break Ok(()),
                    }
                }
                failed = failed_feeds.recv() => {
                    match failed {
                        Some(feed) => break Err(PipelineError::FeedFailed(feed)),
                        // Work queues closed underneath the relays
                        None => break Ok(()),
                    }
                }
            }
        };

        // Dropping the subscriptions unsubscribes from the node
        for handle in tasks {
            handle.abort();
            let _ = handle.await;
        }
        live
    }

    // Enqueue every block from `next_block` through `head`, advancing `next_block`
    async fn enqueue_blocks(
        &self,
        blocks: &Sender<u64>,
        next_block: &mut u64,
        head: u64,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Enqueued {
        while *next_block <= head {
            tokio::select! {
                _ = shutdown.recv() => return Enqueued::Shutdown,
                sent = blocks.send(*next_block) => {
                    if sent.is_err() {
                        return Enqueued::Closed;
                    }
                    *next_block += 1;
                }
            }
        }
        Enqueued::Done
    }

    fn spawn_workers(
        &self,
        blocks: Receiver<u64>,
        mut pending_txs: Receiver<FixedBytes<32>>,
        mut removed_logs: Receiver<RpcLogData>,
        stop: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let blocks = Arc::new(Mutex::new(blocks));
        let mut workers: Vec<JoinHandle<()>> = (0..self.config.block_workers.max(1))
            .map(|worker_id| {
                let pipeline = self.clone();
                let blocks = blocks.clone();
                let mut stop = stop.clone();
                tokio::spawn(async move {
                    loop {
                        let next = blocks.lock().await.recv().await;
                        let Some(block_number) = next else { break };
                        pipeline.index_block_until_done(block_number, &mut stop).await;
                    }
                    debug!("Block worker {} stopped", worker_id);
                })
            })
            .collect();

        let pipeline = self.clone();
        workers.push(tokio::spawn(async move {
            while let Some(hash) = pending_txs.recv().await {
                match pipeline.processor.process_pending(hash).await {
                    Ok(records) if records.is_empty() => {}
                    Ok(records) => {
                        if let Ok(accepted) = pipeline.submit(&records).await {
                            if let Some(metrics) = &pipeline.metrics {
                                metrics.record_pending(accepted);
                            }
                        }
                    }
                    Err(e) => warn!("Failed to process pending transaction {}: {}", hash, e),
                }
            }
            debug!("Pending transaction worker stopped");
        }));

        let pipeline = self.clone();
        workers.push(tokio::spawn(async move {
            while let Some(log) = removed_logs.recv().await {
                if let Some(record) = pipeline.processor.process_removed_log(&log).await {
                    info!(
                        "Transfer log {:?} of transaction {:?} removed by reorganization",
                        log.log_index, log.transaction_hash
                    );
                    let _ = pipeline.submit(&[record]).await;
                }
            }
            debug!("Removed log worker stopped");
        }));

        workers
    }

    // Retry a failing block with backoff until it is indexed, so its gap in the checkpoint
    // closes. Only a stop request abandons it, leaving it for the next run.
    async fn index_block_until_done(&self, block_number: u64, stop: &mut watch::Receiver<bool>) {
        let retry_config = &self.config.retry;
        let mut delay = retry_config.base_delay_ms.max(1);
        let mut attempt: u32 = 1;

        loop {
            let error = match self.index_block(block_number).await {
                Ok(()) => return,
                Err(e) => e,
            };

            if *stop.borrow() {
                error!(
                    "Block {} failed while stopping and stays unindexed: {}",
                    block_number, error
                );
                return;
            }
            warn!(
                "Attempt {} for block {} failed: {}. Retrying in {}ms...",
                attempt, block_number, error, delay
            );

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = stop.changed() => {
                    error!(
                        "Stopped retrying block {} after {} attempts",
                        block_number, attempt
                    );
                    return;
                }
            }
            delay = next_delay(retry_config, delay);
            attempt += 1;
        }
    }

    /// Process, submit and checkpoint one block. A failure leaves the block incomplete, which
    /// holds the checkpoint below it.
    pub async fn index_block(&self, block_number: u64) -> Result<(), PipelineError> {
        let start = Instant::now();

        let processed = self.processor.process_block(block_number).await?;
        let accepted = self.submit(&processed.records).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_block(block_number, accepted, start.elapsed());
        }
        debug!(
            "Block {} indexed with {} records in {:?}",
            processed.block_number,
            accepted,
            start.elapsed()
        );

        // Persisted under the lock so concurrent workers never write an older checkpoint
        let mut tracker = self.tracker.lock().await;
        if let Some(last_block) = tracker.complete(block_number) {
            match self.checkpoint.advance_last_block(last_block) {
                Ok(true) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_checkpoint(last_block);
                    }
                    debug!("Checkpoint advanced to block {}", last_block);
                }
                Ok(false) => debug!("Stored checkpoint is already past block {}", last_block),
                Err(e) => error!("Failed to persist checkpoint {}: {}", last_block, e),
            }
        }
        Ok(())
    }

    async fn submit(&self, records: &[TransferRecord]) -> Result<usize, SinkError> {
        self.sink.submit(records).await.inspect_err(|e| {
            error!(
                "{} sink rejected {} records: {}",
                self.sink.name(),
                records.len(),
                e
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_sink_error(self.sink.name());
            }
        })
    }

    fn record_chain_tip(&self, head: u64) {
        if let Some(metrics) = &self.metrics {
            metrics.record_chain_tip(head);
        }
    }

    fn spawn_reporter(&self, gauges: QueueGauges) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.report_interval_secs.max(1));
        let metrics = self.metrics.clone();
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let depths: Vec<String> = match gauges.lock() {
                    Ok(gauges) => gauges
                        .iter()
                        .filter_map(|(queue, gauge)| {
                            let depth = gauge.depth()?;
                            if let Some(metrics) = &metrics {
                                metrics.record_queue_depth(queue, depth);
                            }
                            Some(format!("{}={}", queue, depth))
                        })
                        .collect(),
                    Err(_) => return,
                };
                info!("Queue depths: {}", depths.join(", "));

                // Blocks finished above a gap that has not closed yet
                let (next, completed_ahead) = {
                    let tracker = tracker.lock().await;
                    (tracker.next(), tracker.pending_completions())
                };
                if let Some(metrics) = &metrics {
                    metrics.record_queue_depth("completed_ahead", completed_ahead);
                }
                if completed_ahead > 0 {
                    info!(
                        "Checkpoint waiting on block {} with {} later blocks done",
                        next, completed_ahead
                    );
                }
            }
        })
    }
}

// Move events of a light feed onto its work queue. A closed event queue means the pump gave up,
// which is reported on `failed`.
async fn relay<T: Send + 'static>(
    feed: &'static str,
    mut events: Receiver<T>,
    work: Sender<T>,
    failed: Sender<&'static str>,
) {
    while let Some(event) = events.recv().await {
        if work.send(event).await.is_err() {
            return;
        }
    }
    let _ = failed.send(feed).await;
}

// Forward one live feed into its bounded event queue. Returning drops the sender, which the
// live loop sees as the feed failing.
async fn pump<T: Send + 'static>(
    feed: &'static str,
    mut stream: FeedStream<T>,
    events: Sender<T>,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                error!("Live feed {} failed: {}", feed, e);
                return;
            }
        }
    }
    error!("Live feed {} ended", feed);
}
