use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use pronos_core::WageSummary;

use super::*;

const BASE: &str = "https://fbref.com/en";
const SEASON: &str = "2022-2023";

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Serves scripted responses by URL. A queue with one entry left repeats it;
/// an unknown URL is a 404.
#[derive(Default)]
struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<FetchResult>>>,
    calls: Mutex<Vec<String>>,
    hang_on: Option<String>,
    cancel_on_fetch: Option<Arc<AtomicBool>>,
}

impl ScriptedFetcher {
    fn page(self, url: &str, body: &str) -> Self {
        self.respond(url, ok(url, body))
    }

    fn respond(self, url: &str, result: FetchResult) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(result);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_response(&self, url: &str) -> Option<FetchResult> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(flag) = &self.cancel_on_fetch {
            flag.store(true, Ordering::SeqCst);
        }
        if self.hang_on.as_deref() == Some(url) {
            return None;
        }
        let mut responses = self.responses.lock().unwrap();
        let result = match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Some(result.unwrap_or(FetchResult::Failure {
            kind: FailureKind::NotFound,
            message: "HTTP 404 Not Found".to_string(),
            attempt_count: 1,
        }))
    }
}

impl Fetch for ScriptedFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = FetchResult> + Send {
        let response = self.next_response(url);
        async move {
            match response {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }
}

fn ok(url: &str, body: &str) -> FetchResult {
    FetchResult::Success {
        document: Document::new(url, body),
        http_status: 200,
        fetched_at: Utc::now(),
        attempt_count: 1,
    }
}

fn failure(kind: FailureKind) -> FetchResult {
    FetchResult::Failure {
        kind,
        message: format!("scripted {kind}"),
        attempt_count: 3,
    }
}

#[derive(Default)]
struct MemorySink {
    written: BTreeMap<String, Vec<CollectedRecord>>,
    summaries: Vec<WageSummary>,
    staged: BTreeMap<(String, String), Vec<MatchStatRecord>>,
    existing: BTreeSet<String>,
}

impl RecordSink for MemorySink {
    fn exists(&self, target: &Target) -> bool {
        self.existing.contains(&target.key()) || self.written.contains_key(&target.key())
    }

    fn persist(
        &mut self,
        target: &Target,
        records: &[CollectedRecord],
    ) -> Result<Vec<PathBuf>, StoreError> {
        self.written.insert(target.key(), records.to_vec());
        Ok(vec![PathBuf::from(target.key())])
    }

    fn persist_summary(&mut self, summary: &WageSummary) -> Result<PathBuf, StoreError> {
        self.summaries.push(summary.clone());
        Ok(PathBuf::from("summary"))
    }

    fn stage_match(
        &mut self,
        target: &Target,
        match_id: &str,
        records: &[MatchStatRecord],
    ) -> Result<(), StoreError> {
        self.staged
            .insert((target.key(), match_id.to_string()), records.to_vec());
        Ok(())
    }

    fn load_staged_match(
        &self,
        target: &Target,
        match_id: &str,
    ) -> Result<Option<Vec<MatchStatRecord>>, StoreError> {
        Ok(self
            .staged
            .get(&(target.key(), match_id.to_string()))
            .cloned())
    }

    fn clear_staging(&mut self, target: &Target) -> Result<(), StoreError> {
        let key = target.key();
        self.staged.retain(|(target_key, _), _| *target_key != key);
        Ok(())
    }
}

struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("pronos-runner-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn checkpoint(&self) -> CheckpointStore {
        CheckpointStore::open(self.0.join("checkpoint.json")).unwrap()
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const TEAMS: [(&str, &str); 4] = [
    ("18bb7c10", "Arsenal"),
    ("b8fd03ef", "Manchester City"),
    ("822bd0ba", "Liverpool"),
    ("cff3d9bb", "Chelsea"),
];

fn registry() -> TeamRegistry {
    let mut registry = TeamRegistry::new(BASE);
    for (id, name) in TEAMS {
        registry.insert(id, name, SEASON);
    }
    registry
}

fn target(index: usize, kind: DataKind) -> Target {
    let (id, name) = TEAMS[index];
    Target::new(id, name, SEASON, kind)
}

fn fixtures_url(index: usize) -> String {
    let (id, name) = TEAMS[index];
    format!(
        "{BASE}/squads/{id}/{SEASON}/all_comps/{}-Stats-All-Competitions",
        name.replace(' ', "-")
    )
}

fn wages_url(index: usize) -> String {
    let (id, name) = TEAMS[index];
    format!("{BASE}/squads/{id}/{SEASON}/wages/{}-Wage-Details", name.replace(' ', "-"))
}

fn fixture_row(opponent: &str, result: &str, match_id: Option<&str>) -> String {
    let report = match_id.map_or(String::new(), |id| {
        format!(r#"<a href="/en/matches/{id}/Match-Report">Match Report</a>"#)
    });
    format!(
        r#"<tr>
          <th data-stat="date">2022-08-05</th>
          <td data-stat="comp">Premier League</td>
          <td data-stat="venue">Home</td>
          <td data-stat="result">{result}</td>
          <td data-stat="goals_for">2</td>
          <td data-stat="goals_against">1</td>
          <td data-stat="opponent">{opponent}</td>
          <td data-stat="match_report">{report}</td>
        </tr>"#
    )
}

fn fixtures_page(rows: &[String]) -> String {
    format!(
        r#"<html><body><table id="matchlogs_for"><tbody>{}</tbody></table></body></html>"#,
        rows.concat()
    )
}

fn match_page() -> String {
    r#"<html><body><div id="team_stats"><table>
        <tr><th>Arsenal</th><th>Chelsea</th></tr>
        <tr><th colspan="2">Possession</th></tr>
        <tr><td>61%</td><td>39%</td></tr>
    </table></div></body></html>"#
        .to_string()
}

fn match_url(id: &str) -> String {
    format!("{BASE}/matches/{id}/Match-Report")
}

fn wages_page() -> String {
    r#"<html><body><div id="meta"></div><table id="wages"><tbody>
        <tr><th data-stat="player">A</th><td data-stat="weekly_wages">£ 100,000</td><td data-stat="notes">Estimated</td></tr>
        <tr><th data-stat="player">B</th><td data-stat="weekly_wages">£ 50,000</td><td data-stat="notes"></td></tr>
    </tbody></table></body></html>"#
        .to_string()
}

fn options() -> RunOptions {
    RunOptions {
        skip_existing: BTreeSet::new(),
        max_matches: None,
        target_policy: RetryPolicy::new(1, Duration::ZERO, Duration::ZERO),
        wages: WagesExtractor::default(),
    }
}

struct Harness {
    limiter: RateLimiter,
    registry: TeamRegistry,
    checkpoint: CheckpointStore,
    sink: MemorySink,
    cancel: Arc<AtomicBool>,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new();
        Self {
            limiter: RateLimiter::new(Duration::ZERO, Duration::ZERO),
            registry: registry(),
            checkpoint: dir.checkpoint(),
            sink: MemorySink::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            _dir: dir,
        }
    }

    async fn run(&mut self, fetcher: &ScriptedFetcher, options: RunOptions, targets: &[Target]) -> RunStats {
        Orchestrator::new(
            fetcher,
            &mut self.limiter,
            &self.registry,
            &mut self.checkpoint,
            &mut self.sink,
            options,
            Arc::clone(&self.cancel),
        )
        .run(targets)
        .await
        .expect("run completes")
    }
}

fn all_fixture_targets() -> Vec<Target> {
    (0..TEAMS.len()).map(|i| target(i, DataKind::Fixtures)).collect()
}

fn fixtures_fetcher() -> ScriptedFetcher {
    (0..TEAMS.len()).fold(ScriptedFetcher::default(), |fetcher, i| {
        fetcher.page(
            &fixtures_url(i),
            &fixtures_page(&[fixture_row("Chelsea", "W", Some("e62f6e78"))]),
        )
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collects_every_pending_target() {
    let mut harness = Harness::new();
    let targets = all_fixture_targets();
    let fetcher = fixtures_fetcher();

    let stats = harness.run(&fetcher, options(), &targets).await;

    assert_eq!(stats.targets_total, 4);
    assert_eq!(stats.targets_done, 4);
    assert_eq!(stats.records_written, 4);
    assert!(stats.failures.is_empty());
    assert!(stats.finished_at.is_some());
    for target in &targets {
        assert_eq!(harness.checkpoint.status(target), CheckpointStatus::Done);
    }
    let calls: Vec<String> = (0..TEAMS.len()).map(fixtures_url).collect();
    assert_eq!(fetcher.calls(), calls);
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let mut harness = Harness::new();
    let targets = all_fixture_targets();

    harness.run(&fixtures_fetcher(), options(), &targets).await;
    let written_first = harness.sink.written.clone();
    let statuses_first: Vec<CheckpointStatus> =
        targets.iter().map(|t| harness.checkpoint.status(t)).collect();

    let fetcher = fixtures_fetcher();
    let stats = harness.run(&fetcher, options(), &targets).await;

    assert_eq!(stats.targets_pending, 0);
    assert_eq!(stats.targets_done, 0);
    assert!(fetcher.calls().is_empty());
    assert_eq!(harness.sink.written, written_first);
    let statuses_second: Vec<CheckpointStatus> =
        targets.iter().map(|t| harness.checkpoint.status(t)).collect();
    assert_eq!(statuses_first, statuses_second);
}

#[tokio::test]
async fn resumed_run_processes_only_remaining_targets_in_order() {
    let mut harness = Harness::new();
    let targets = all_fixture_targets();
    harness
        .checkpoint
        .mark(&targets[0], CheckpointStatus::Done, None)
        .unwrap();
    harness
        .checkpoint
        .mark(&targets[2], CheckpointStatus::Done, None)
        .unwrap();

    let fetcher = fixtures_fetcher();
    let stats = harness.run(&fetcher, options(), &targets).await;

    assert_eq!(stats.targets_pending, 2);
    assert_eq!(stats.targets_done, 2);
    assert_eq!(fetcher.calls(), vec![fixtures_url(1), fixtures_url(3)]);
}

#[tokio::test]
async fn rejected_rows_are_counted_and_never_persisted() {
    let mut harness = Harness::new();
    let target = target(0, DataKind::Fixtures);
    let fetcher = ScriptedFetcher::default().page(
        &fixtures_url(0),
        &fixtures_page(&[
            fixture_row("Chelsea", "W", Some("e62f6e78")),
            fixture_row("", "L", None),
        ]),
    );

    let stats = harness.run(&fetcher, options(), std::slice::from_ref(&target)).await;

    assert_eq!(stats.records_written, 1);
    assert_eq!(stats.records_rejected, 1);
    assert_eq!(stats.rejections.get(&target.key()), Some(&1));
    let written = &harness.sink.written[&target.key()];
    assert_eq!(written.len(), 1);
}

#[tokio::test]
async fn not_found_fails_permanently_without_target_retry() {
    let mut harness = Harness::new();
    let targets = vec![target(0, DataKind::Fixtures), target(1, DataKind::Fixtures)];
    let fetcher = ScriptedFetcher::default().page(
        &fixtures_url(1),
        &fixtures_page(&[fixture_row("Chelsea", "W", None)]),
    );

    let stats = harness.run(&fetcher, options(), &targets).await;

    assert_eq!(stats.targets_failed, 1);
    assert_eq!(stats.targets_done, 1);
    assert_eq!(stats.failures[0].kind, FailureKind::NotFound);
    assert_eq!(stats.failures[0].attempts, 1);
    assert_eq!(
        harness.checkpoint.status(&targets[0]),
        CheckpointStatus::FailedPermanent
    );
    assert_eq!(fetcher.calls().len(), 2);
}

#[tokio::test]
async fn transient_failure_uses_the_target_retry_budget() {
    let mut harness = Harness::new();
    let target = target(0, DataKind::Fixtures);
    let fetcher = ScriptedFetcher::default()
        .respond(&fixtures_url(0), failure(FailureKind::TransientExhausted))
        .respond(&fixtures_url(0), failure(FailureKind::TransientExhausted))
        .respond(&fixtures_url(0), failure(FailureKind::TransientExhausted));

    let stats = harness.run(&fetcher, options(), std::slice::from_ref(&target)).await;

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].kind, FailureKind::TransientExhausted);
    assert_eq!(stats.failures[0].attempts, 2);
    let entry = harness.checkpoint.entry(&target).unwrap();
    assert_eq!(entry.status, CheckpointStatus::FailedPermanent);
    assert_eq!(entry.attempts, 2);
}

#[tokio::test]
async fn transient_failure_then_success_is_done() {
    let mut harness = Harness::new();
    let target = target(0, DataKind::Fixtures);
    let fetcher = ScriptedFetcher::default()
        .respond(&fixtures_url(0), failure(FailureKind::TransientExhausted))
        .page(&fixtures_url(0), &fixtures_page(&[]));

    let stats = harness.run(&fetcher, options(), std::slice::from_ref(&target)).await;

    assert_eq!(stats.targets_done, 1);
    assert!(stats.failures.is_empty());
    let entry = harness.checkpoint.entry(&target).unwrap();
    assert_eq!(entry.status, CheckpointStatus::Done);
    assert!(entry.error_summary.is_none());
}

#[tokio::test]
async fn blocked_and_parse_errors_are_distinguished() {
    let mut harness = Harness::new();
    let targets = vec![target(0, DataKind::Fixtures), target(1, DataKind::Fixtures)];
    let fetcher = ScriptedFetcher::default()
        .respond(&fixtures_url(0), failure(FailureKind::Blocked))
        .page(&fixtures_url(1), "<html><body><h1>Page Not Found</h1></body></html>");

    let stats = harness.run(&fetcher, options(), &targets).await;

    let by_kind = stats.failures_by_kind();
    assert_eq!(by_kind.get(&FailureKind::Blocked), Some(&1));
    assert_eq!(by_kind.get(&FailureKind::ParseError), Some(&1));
    assert_eq!(stats.parse_errors()[0].target_key, targets[1].key());
    assert_eq!(harness.checkpoint.failed_targets().len(), 2);
}

#[tokio::test]
async fn unknown_team_fails_permanently_without_fetching() {
    let mut harness = Harness::new();
    let unknown = Target::new("unresolved:real-madrid", "Real Madrid", SEASON, DataKind::Fixtures);
    let fetcher = ScriptedFetcher::default();

    let stats = harness.run(&fetcher, options(), std::slice::from_ref(&unknown)).await;

    assert!(fetcher.calls().is_empty());
    assert_eq!(stats.failures[0].kind, FailureKind::UnknownTeam);
    assert_eq!(
        harness.checkpoint.entry(&unknown).unwrap().failure_kind,
        Some(FailureKind::UnknownTeam)
    );
}

#[tokio::test]
async fn existing_output_is_skipped_when_requested() {
    let mut harness = Harness::new();
    let targets = all_fixture_targets();
    harness.sink.existing.insert(targets[0].key());
    let mut options = options();
    options.skip_existing.insert(DataKind::Fixtures);

    let fetcher = fixtures_fetcher();
    let stats = harness.run(&fetcher, options, &targets).await;

    assert_eq!(stats.targets_skipped, 1);
    assert_eq!(stats.targets_done, 3);
    assert!(!fetcher.calls().contains(&fixtures_url(0)));
    assert_eq!(harness.checkpoint.status(&targets[0]), CheckpointStatus::Done);
}

#[tokio::test]
async fn cancellation_stops_between_targets() {
    let mut harness = Harness::new();
    let targets = all_fixture_targets();
    let fetcher = ScriptedFetcher {
        cancel_on_fetch: Some(Arc::clone(&harness.cancel)),
        ..fixtures_fetcher()
    };

    let stats = harness.run(&fetcher, options(), &targets).await;

    assert!(stats.cancelled);
    assert_eq!(stats.targets_done, 1);
    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(harness.checkpoint.status(&targets[0]), CheckpointStatus::Done);
    assert_eq!(harness.checkpoint.status(&targets[1]), CheckpointStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn aborted_fetch_leaves_target_in_progress() {
    let mut harness = Harness::new();
    let targets = all_fixture_targets();
    let fetcher = ScriptedFetcher {
        hang_on: Some(fixtures_url(1)),
        ..fixtures_fetcher()
    };

    let result = tokio::time::timeout(
        Duration::from_secs(60),
        harness.run(&fetcher, options(), &targets),
    )
    .await;
    assert!(result.is_err(), "expected the hung fetch to time out");

    assert_eq!(harness.checkpoint.status(&targets[0]), CheckpointStatus::Done);
    assert_eq!(harness.checkpoint.status(&targets[1]), CheckpointStatus::InProgress);

    let reopened = CheckpointStore::open(harness.checkpoint.path()).unwrap();
    assert_eq!(
        reopened.pending_targets(&targets),
        targets[1..].to_vec()
    );
}

#[tokio::test]
async fn wages_target_writes_records_and_summary() {
    let mut harness = Harness::new();
    let target = target(1, DataKind::Wages);
    let fetcher = ScriptedFetcher::default().page(&wages_url(1), &wages_page());

    let stats = harness.run(&fetcher, options(), std::slice::from_ref(&target)).await;

    assert_eq!(stats.records_written, 2);
    let summary = &harness.sink.summaries[0];
    assert_eq!(summary.player_count, 2);
    assert_eq!(summary.total_wage_bill, 150_000 * 52);
    assert_eq!(summary.top_earner_wage, 100_000 * 52);
    assert_eq!(summary.unverified_count, 1);
}

#[tokio::test]
async fn match_stats_follow_played_fixtures() {
    let mut harness = Harness::new();
    let target = target(0, DataKind::MatchStats);
    let fetcher = ScriptedFetcher::default()
        .page(
            &fixtures_url(0),
            &fixtures_page(&[
                fixture_row("Chelsea", "W", Some("aaaa0001")),
                fixture_row("Liverpool", "D", Some("aaaa0002")),
                fixture_row("Everton", "", None),
            ]),
        )
        .page(&match_url("aaaa0001"), &match_page())
        .page(&match_url("aaaa0002"), &match_page());

    let stats = harness.run(&fetcher, options(), std::slice::from_ref(&target)).await;

    assert_eq!(stats.targets_done, 1);
    assert_eq!(stats.records_written, 4);
    assert_eq!(
        fetcher.calls(),
        vec![fixtures_url(0), match_url("aaaa0001"), match_url("aaaa0002")]
    );
    assert!(harness.sink.staged.is_empty());
    assert_eq!(harness.checkpoint.completed_units(&target).len(), 2);
}

#[tokio::test]
async fn match_stats_resume_skips_completed_matches() {
    let mut harness = Harness::new();
    let target = target(0, DataKind::MatchStats);

    // First attempt: the second match page fails with a permanent error.
    let fetcher = ScriptedFetcher::default()
        .page(
            &fixtures_url(0),
            &fixtures_page(&[
                fixture_row("Chelsea", "W", Some("aaaa0001")),
                fixture_row("Liverpool", "D", Some("aaaa0002")),
            ]),
        )
        .page(&match_url("aaaa0001"), &match_page())
        .respond(&match_url("aaaa0002"), failure(FailureKind::Blocked));
    let stats = harness.run(&fetcher, options(), std::slice::from_ref(&target)).await;
    assert_eq!(stats.failures[0].kind, FailureKind::Blocked);
    assert_eq!(harness.sink.staged.len(), 1);

    harness.checkpoint.readmit_failed().unwrap();
    let fetcher = ScriptedFetcher::default()
        .page(
            &fixtures_url(0),
            &fixtures_page(&[
                fixture_row("Chelsea", "W", Some("aaaa0001")),
                fixture_row("Liverpool", "D", Some("aaaa0002")),
            ]),
        )
        .page(&match_url("aaaa0002"), &match_page());
    let stats = harness.run(&fetcher, options(), std::slice::from_ref(&target)).await;

    assert_eq!(stats.targets_done, 1);
    assert_eq!(stats.records_written, 4);
    assert_eq!(fetcher.calls(), vec![fixtures_url(0), match_url("aaaa0002")]);
}

#[tokio::test]
async fn max_matches_caps_match_pages() {
    let mut harness = Harness::new();
    let target = target(0, DataKind::MatchStats);
    let fetcher = ScriptedFetcher::default()
        .page(
            &fixtures_url(0),
            &fixtures_page(&[
                fixture_row("Chelsea", "W", Some("aaaa0001")),
                fixture_row("Liverpool", "D", Some("aaaa0002")),
            ]),
        )
        .page(&match_url("aaaa0001"), &match_page())
        .page(&match_url("aaaa0002"), &match_page());
    let mut options = options();
    options.max_matches = Some(1);

    let stats = harness.run(&fetcher, options, std::slice::from_ref(&target)).await;

    assert_eq!(stats.records_written, 2);
    assert_eq!(fetcher.calls().len(), 2);
}
