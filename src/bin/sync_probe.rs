use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Instant;
use std::{env, fs, path::Path, path::PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use tokio::runtime::Runtime;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

use setsubi_sync::application::ports::{
    ChangeKind, ConnectivityProbe, ConnectivitySignal, ContractorApi, RealtimeDisposer,
    RealtimeSubscription, RealtimeTransport, RowChange,
};
use setsubi_sync::application::services::contractor_sync::{ContractorSyncService, SyncSnapshot};
use setsubi_sync::domain::conflict::ConflictStrategy;
use setsubi_sync::domain::entities::{Contractor, ContractorDraft, ContractorSummary};
use setsubi_sync::domain::value_objects::{ContractKind, ContractStatus};
use setsubi_sync::infrastructure::storage::MemorySnapshotStore;
use setsubi_sync::shared::config::SyncConfig;
use setsubi_sync::shared::error::AppError;

const DEFAULT_RECORDS: usize = 24;
const DEFAULT_EVENTS: usize = 12;

const SERVICES: [&str; 5] = [
    "Janitorial services daily",
    "HVAC maintenance quarterly",
    "Security patrol nightly",
    "Elevator inspection monthly",
    "Landscaping upkeep weekly",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Smoke,
    Offline,
    Conflict,
}

impl Scenario {
    fn as_str(&self) -> &'static str {
        match self {
            Scenario::Smoke => "smoke",
            Scenario::Offline => "offline",
            Scenario::Conflict => "conflict",
        }
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    scenario: Scenario,
    records: usize,
    events: usize,
    output: Option<PathBuf>,
    pretty: bool,
}

#[derive(Debug, serde::Serialize)]
struct ProbeReport {
    scenario: &'static str,
    generated_at_ms: i64,
    records_seeded: usize,
    events_pushed: usize,
    elapsed_ms: u128,
    steps: Vec<String>,
    snapshot: SyncSnapshot,
}

fn usage() -> &'static str {
    "Usage: sync_probe [--scenario <smoke|offline|conflict>] [--records <n>] [--events <n>] [--output <path>] [--pretty]"
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args.into_iter())?;
    setsubi_sync::init_logging();

    let rt = Runtime::new().context("Failed to create Tokio runtime")?;
    let report = rt.block_on(run_scenario(&options))?;

    let payload = to_json(&report, options.pretty)?;
    emit_payload(options.output.as_deref(), &payload)
}

async fn run_scenario(options: &CliOptions) -> Result<ProbeReport> {
    let started = Instant::now();
    let mut steps = Vec::new();

    let api = Arc::new(StaticApi::new(generate_records(options.records)));
    let transport = Arc::new(ScriptedTransport::new());
    let probe = Arc::new(ScriptedProbe::online());
    let store = Arc::new(MemorySnapshotStore::new());
    let service = ContractorSyncService::new(
        api.clone(),
        transport.clone(),
        probe.clone(),
        store,
        SyncConfig::default(),
        ConflictStrategy::default(),
    )
    .await;

    let (events_pushed, snapshot) = match options.scenario {
        Scenario::Smoke => run_smoke(options, &service, &transport, &mut steps).await?,
        Scenario::Offline => run_offline(&service, &probe, &mut steps).await?,
        Scenario::Conflict => run_conflict(&service, &api, &transport, &mut steps).await?,
    };

    service.shutdown().await;
    steps.push("service shut down".to_string());

    Ok(ProbeReport {
        scenario: options.scenario.as_str(),
        generated_at_ms: Utc::now().timestamp_millis(),
        records_seeded: options.records,
        events_pushed,
        elapsed_ms: started.elapsed().as_millis(),
        steps,
        snapshot,
    })
}

/// 取得 → リアルタイム連続イベント → 診断スナップショット
async fn run_smoke(
    options: &CliOptions,
    service: &ContractorSyncService,
    transport: &ScriptedTransport,
    steps: &mut Vec<String>,
) -> Result<(usize, SyncSnapshot)> {
    service.load(true, false).await?;
    steps.push(format!(
        "loaded {} contractors from network",
        service.records().await.len()
    ));

    transport.wait_for_subscription().await?;
    let base = options.records as i64;
    for i in 0..options.events {
        let change = match i % 3 {
            0 => insert_event(generate_one(base + i as i64 + 1)),
            1 => update_event({
                let mut record = generate_one((i as i64 % base) + 1);
                record.name = format!("{} (renewed)", record.name);
                record
            }),
            _ => delete_event((i as i64 * 7) % base + 1),
        };
        transport.push(change).await?;
    }
    steps.push(format!("pushed {} realtime events", options.events));

    let expected = options.events as u64;
    let snapshot = wait_for_snapshot(service, "realtime events to be processed", |snap| {
        snap.realtime.events.accepted + snap.realtime.events.rejected >= expected
    })
    .await?;
    steps.push(format!(
        "processed events: accepted={} rejected={}",
        snapshot.realtime.events.accepted, snapshot.realtime.events.rejected
    ));
    Ok((options.events, snapshot))
}

/// オンラインで温めたキャッシュをオフラインで読み直す
async fn run_offline(
    service: &ContractorSyncService,
    probe: &ScriptedProbe,
    steps: &mut Vec<String>,
) -> Result<(usize, SyncSnapshot)> {
    service.load(true, false).await?;
    steps.push(format!(
        "warmed cache with {} contractors",
        service.records().await.len()
    ));

    probe.go_offline();
    wait_for_snapshot(service, "monitor to notice offline", |snap| snap.is_offline).await?;
    steps.push("connection lost".to_string());

    service.load(true, false).await?;
    let snapshot = service.snapshot().await;
    steps.push(format!(
        "served {} contractors from cache while offline",
        snapshot.records.len()
    ));
    Ok((0, snapshot))
}

/// 楽観的更新の送信中に競合するサーバー編集を届け、自動マージさせる
async fn run_conflict(
    service: &ContractorSyncService,
    api: &StaticApi,
    transport: &ScriptedTransport,
    steps: &mut Vec<String>,
) -> Result<(usize, SyncSnapshot)> {
    service.load(true, false).await?;
    transport.wait_for_subscription().await?;

    let mut local = service.records().await[0].clone();
    local.monthly_amount = local.monthly_amount.map(|amount| amount + 500.0);
    local.notes = Some("Renegotiated on-site".to_string());

    api.set_update_delay_ms(30_000);
    let in_flight = tokio::spawn({
        let service = service.clone();
        let local = local.clone();
        async move { service.update_local(local).await }
    });
    wait_for_snapshot(service, "optimistic update to register", |snap| {
        snap.pending_operations == 1
    })
    .await?;
    steps.push(format!("optimistic update in flight for contractor {}", local.id));

    let mut server = service.records().await[0].clone();
    server.name = format!("{} Holdings", server.name);
    server.notes = Some("Billing contact changed".to_string());
    server.updated_at = Utc::now();
    transport.push(update_event(server)).await?;
    steps.push("conflicting server edit delivered".to_string());

    let snapshot = wait_for_snapshot(service, "conflict to be auto-resolved", |snap| {
        snap.pending_operations == 0
    })
    .await?;
    steps.push(format!(
        "merged row notes: {:?}",
        snapshot.records.first().and_then(|r| r.notes.clone())
    ));

    in_flight.abort();
    Ok((1, snapshot))
}

async fn wait_for_snapshot<F>(
    service: &ContractorSyncService,
    what: &str,
    satisfied: F,
) -> Result<SyncSnapshot>
where
    F: Fn(&SyncSnapshot) -> bool,
{
    for _ in 0..400 {
        let snapshot = service.snapshot().await;
        if satisfied(&snapshot) {
            return Ok(snapshot);
        }
        sleep(Duration::from_millis(25)).await;
    }
    bail!("Timed out waiting for {what}")
}

fn generate_records(count: usize) -> Vec<Contractor> {
    (1..=count as i64).map(generate_one).collect()
}

/// id から決まる疑似データ。満了間近・期限切れ・PO を混ぜる
fn generate_one(id: i64) -> Contractor {
    let index = (id - 1) as usize;
    let today = Utc::now().date_naive();
    let end_date = today + chrono::Duration::days(((id * 17) % 90) - 10);
    let start_date = end_date - chrono::Duration::days(365);
    let status = match index % 4 {
        0 | 1 => ContractStatus::Active,
        2 => ContractStatus::Pending,
        _ => ContractStatus::Expired,
    };
    let now = Utc::now();
    Contractor {
        id,
        name: format!("Vendor {id:03}"),
        service_description: SERVICES[index % SERVICES.len()].to_string(),
        notes: (index % 3 == 0).then(|| format!("Front desk ext {}", 100 + id)),
        status,
        kind: if index % 5 == 0 {
            ContractKind::PurchaseOrder
        } else {
            ContractKind::Contract
        },
        start_date,
        end_date,
        monthly_amount: Some(50_000.0 + (index as f64) * 1_000.0),
        yearly_amount: None,
        created_at: now,
        updated_at: now,
    }
}

fn insert_event(record: Contractor) -> RowChange {
    RowChange {
        kind: ChangeKind::Insert,
        new_row: serde_json::to_value(&record).ok(),
        old_row: None,
        observed_at: Utc::now(),
    }
}

fn update_event(record: Contractor) -> RowChange {
    RowChange {
        kind: ChangeKind::Update,
        new_row: serde_json::to_value(&record).ok(),
        old_row: None,
        observed_at: Utc::now(),
    }
}

fn delete_event(id: i64) -> RowChange {
    RowChange {
        kind: ChangeKind::Delete,
        new_row: None,
        old_row: Some(serde_json::json!({ "id": id })),
        observed_at: Utc::now(),
    }
}

/// プロセス内で完結するサーバー代替
struct StaticApi {
    records: RwLock<Vec<Contractor>>,
    update_delay_ms: AtomicU64,
}

impl StaticApi {
    fn new(records: Vec<Contractor>) -> Self {
        Self {
            records: RwLock::new(records),
            update_delay_ms: AtomicU64::new(0),
        }
    }

    fn set_update_delay_ms(&self, ms: u64) {
        self.update_delay_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContractorApi for StaticApi {
    async fn list(&self) -> Result<Vec<Contractor>, AppError> {
        Ok(self.records.read().await.clone())
    }

    async fn create(&self, draft: ContractorDraft) -> Result<Contractor, AppError> {
        let mut records = self.records.write().await;
        let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let now = Utc::now();
        let created = Contractor {
            id,
            name: draft.name,
            service_description: draft.service_description,
            notes: draft.notes,
            status: draft.status,
            kind: draft.kind,
            start_date: draft.start_date,
            end_date: draft.end_date,
            monthly_amount: draft.monthly_amount,
            yearly_amount: draft.yearly_amount,
            created_at: now,
            updated_at: now,
        };
        records.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, record: Contractor) -> Result<Contractor, AppError> {
        let delay = self.update_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        let mut records = self.records.write().await;
        let Some(existing) = records.iter_mut().find(|r| r.id == id) else {
            return Err(AppError::NotFound(format!("contractor {id}")));
        };
        let mut confirmed = record;
        confirmed.id = id;
        confirmed.updated_at = Utc::now();
        *existing = confirmed.clone();
        Ok(confirmed)
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.records.write().await.retain(|r| r.id != id);
        Ok(())
    }

    async fn aggregate(&self) -> Result<ContractorSummary, AppError> {
        let records = self.records.read().await;
        Ok(ContractorSummary::derive(&records, Utc::now().date_naive()))
    }
}

/// プローブからイベントを流し込める購読口
struct ScriptedTransport {
    event_tx: Mutex<Option<futures::channel::mpsc::UnboundedSender<RowChange>>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self {
            event_tx: Mutex::new(None),
        }
    }

    async fn push(&self, change: RowChange) -> Result<()> {
        let tx = self.event_tx.lock().await;
        let Some(tx) = tx.as_ref() else {
            bail!("No active realtime subscription");
        };
        tx.unbounded_send(change)
            .map_err(|_| anyhow::anyhow!("Realtime stream closed"))
    }

    async fn wait_for_subscription(&self) -> Result<()> {
        for _ in 0..200 {
            if self.event_tx.lock().await.is_some() {
                return Ok(());
            }
            sleep(Duration::from_millis(10)).await;
        }
        bail!("Realtime channel never subscribed")
    }
}

#[async_trait]
impl RealtimeTransport for ScriptedTransport {
    async fn subscribe(
        &self,
        _table: &str,
        _kinds: &[ChangeKind],
    ) -> Result<RealtimeSubscription, AppError> {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        *self.event_tx.lock().await = Some(tx);
        Ok(RealtimeSubscription {
            events: Box::pin(rx),
            disposer: RealtimeDisposer::noop(),
        })
    }
}

/// オン・オフを手で切り替える接続プローブ
struct ScriptedProbe {
    is_online: AtomicBool,
    feed_tx: futures::channel::mpsc::UnboundedSender<ConnectivitySignal>,
    feed_rx: StdMutex<Option<futures::channel::mpsc::UnboundedReceiver<ConnectivitySignal>>>,
}

impl ScriptedProbe {
    fn online() -> Self {
        let (feed_tx, feed_rx) = futures::channel::mpsc::unbounded();
        Self {
            is_online: AtomicBool::new(true),
            feed_tx,
            feed_rx: StdMutex::new(Some(feed_rx)),
        }
    }

    fn go_offline(&self) {
        self.is_online.store(false, Ordering::SeqCst);
        let _ = self.feed_tx.unbounded_send(ConnectivitySignal::offline());
    }
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn current(&self) -> ConnectivitySignal {
        if self.is_online.load(Ordering::SeqCst) {
            ConnectivitySignal::online()
        } else {
            ConnectivitySignal::offline()
        }
    }

    fn signals(&self) -> BoxStream<'static, ConnectivitySignal> {
        let rx = self.feed_rx.lock().ok().and_then(|mut slot| slot.take());
        match rx {
            Some(rx) => Box::pin(rx),
            None => Box::pin(futures::stream::pending()),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))
}

fn emit_payload(target: Option<&Path>, payload: &str) -> Result<()> {
    if let Some(path) = target {
        write_output(path, payload)?;
        println!("Probe report written to {}", path.display());
    } else {
        println!("{payload}");
    }
    Ok(())
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut scenario = Scenario::Smoke;
    let mut records = DEFAULT_RECORDS;
    let mut events = DEFAULT_EVENTS;
    let mut output: Option<PathBuf> = None;
    let mut pretty = false;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--scenario" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--scenario requires a value\n{}", usage()))?;
                scenario = parse_scenario(&value)?;
            }
            "--records" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--records requires a value\n{}", usage()))?;
                records = parse_count(&value, "--records")?;
            }
            "--events" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--events requires a value\n{}", usage()))?;
                events = parse_count(&value, "--events")?;
            }
            "-o" | "--output" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--output requires a path\n{}", usage()))?;
                output = Some(PathBuf::from(path));
            }
            "--pretty" => {
                pretty = true;
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => {
                bail!("Unknown argument: {other}\n{}", usage());
            }
        }
    }

    Ok(CliOptions {
        scenario,
        records,
        events,
        output,
        pretty,
    })
}

fn parse_scenario(value: &str) -> Result<Scenario> {
    match value.to_ascii_lowercase().as_str() {
        "smoke" => Ok(Scenario::Smoke),
        "offline" => Ok(Scenario::Offline),
        "conflict" => Ok(Scenario::Conflict),
        other => bail!("Unknown scenario: {other}. Expected 'smoke', 'offline' or 'conflict'."),
    }
}

fn parse_count(value: &str, flag: &str) -> Result<usize> {
    let parsed: usize = value.parse().with_context(|| {
        format!("Invalid value '{value}' for {flag}. Expected a positive integer.")
    })?;
    if parsed == 0 {
        bail!("{flag} must be greater than 0");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let opts = parse_args(Vec::<String>::new()).expect("options");
        assert_eq!(opts.scenario, Scenario::Smoke);
        assert_eq!(opts.records, DEFAULT_RECORDS);
        assert_eq!(opts.events, DEFAULT_EVENTS);
        assert!(opts.output.is_none());
        assert!(!opts.pretty);
    }

    #[test]
    fn parses_conflict_scenario_with_options() {
        let opts = parse_args(
            vec![
                "--scenario".into(),
                "conflict".into(),
                "--records".into(),
                "8".into(),
                "--output".into(),
                "probe.json".into(),
                "--pretty".into(),
            ]
            .into_iter(),
        )
        .expect("options");

        assert_eq!(opts.scenario, Scenario::Conflict);
        assert_eq!(opts.records, 8);
        assert!(opts.pretty);
        assert_eq!(opts.output.as_deref(), Some(Path::new("probe.json")));
    }

    #[test]
    fn rejects_unknown_scenario() {
        let err = parse_args(vec!["--scenario".into(), "chaos".into()].into_iter()).unwrap_err();
        assert!(format!("{err}").contains("Unknown scenario"));
    }

    #[test]
    fn rejects_zero_records() {
        let err = parse_args(vec!["--records".into(), "0".into()].into_iter()).unwrap_err();
        assert!(format!("{err}").contains("greater than 0"));
    }

    #[test]
    fn generated_records_satisfy_invariants() {
        for record in generate_records(40) {
            record.check_invariants().expect("generated record invalid");
        }
    }
}
