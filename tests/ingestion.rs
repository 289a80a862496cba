//! End-to-end tests for the ingestion loop: SQLite store, HTTP fetcher
//! against a mock server, and the aggregator driving both.
//!
//! Each test creates its own in-memory SQLite database and mock server.

use chrono::{DateTime, TimeZone, Utc};
use gator::aggregator::{
    parse_interval, AggregateError, Aggregator, Clock, FailurePolicy, RunSummary, MIN_INTERVAL,
};
use gator::feed::{is_zero, FeedFetcher, FetchError, DEFAULT_USER_AGENT};
use gator::storage::{Database, Feed};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Deterministic clock: each reading is one second after the previous one
struct TickingClock(AtomicI64);

impl TickingClock {
    fn starting_at(secs: i64) -> Self {
        Self(AtomicI64::new(secs))
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0.fetch_add(1, Ordering::SeqCst), 0).unwrap()
    }
}

struct Item<'a> {
    title: &'a str,
    link: &'a str,
    pub_date: &'a str,
}

fn item<'a>(title: &'a str, link: &'a str, pub_date: &'a str) -> Item<'a> {
    Item {
        title,
        link,
        pub_date,
    }
}

fn rss(items: &[Item<'_>]) -> String {
    let body: String = items
        .iter()
        .map(|i| {
            format!(
                "<item><title>{}</title><link>{}</link><pubDate>{}</pubDate>\
                 <description>about {}</description></item>",
                i.title, i.link, i.pub_date, i.title
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Mock</title><link>https://mock.test</link>{body}</channel></rss>"#
    )
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("Content-Type", "application/rss+xml"),
        )
        .mount(server)
        .await;
}

async fn setup(feeds: &[(&str, String)]) -> (Database, Vec<Feed>) {
    let db = Database::open(":memory:").await.unwrap();
    let user = db.create_user("tester").await.unwrap();
    let mut created = Vec::new();
    for (name, url) in feeds {
        let feed = db.create_feed(name, url, user.id).await.unwrap();
        db.create_feed_follow(&user, &feed).await.unwrap();
        created.push(feed);
    }
    (db, created)
}

fn aggregator(db: &Database) -> Aggregator<Database, TickingClock> {
    let fetcher = FeedFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap();
    Aggregator::new(db.clone(), fetcher).with_clock(TickingClock::starting_at(1_700_000_000))
}

/// Poll until `expected` posts are stored, failing after ten seconds
async fn wait_for_posts(db: &Database, expected: i64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while db.count_posts().await.unwrap() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("posts were not stored in time");
}

const DATE: &str = "Mon, 02 Jan 2006 15:04:05 +0000";

// ============================================================================
// Round-trip ingestion
// ============================================================================

#[tokio::test]
async fn test_one_round_over_two_feeds_stores_every_item() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/three",
        rss(&[
            item("a1", "https://a.test/1", DATE),
            item("a2", "https://a.test/2", DATE),
            item("a3", "https://a.test/3", DATE),
        ]),
    )
    .await;
    serve(
        &server,
        "/two",
        rss(&[
            item("b1", "https://b.test/1", DATE),
            item("b2", "https://b.test/2", DATE),
        ]),
    )
    .await;

    let (db, _) = setup(&[
        ("Three", format!("{}/three", server.uri())),
        ("Two", format!("{}/two", server.uri())),
    ])
    .await;
    let mut agg = aggregator(&db);

    let first = agg.run_cycle().await.unwrap();
    let second = agg.run_cycle().await.unwrap();

    assert_eq!(first.feed_name, "Three");
    assert_eq!(first.inserted, 3);
    assert_eq!(second.feed_name, "Two");
    assert_eq!(second.inserted, 2);
    assert_eq!(db.count_posts().await.unwrap(), 5);
}

#[tokio::test]
async fn test_refetch_adds_nothing() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/feed",
        rss(&[
            item("new", "https://c.test/new", DATE),
            item("old", "https://c.test/old", DATE),
        ]),
    )
    .await;

    let (db, feeds) = setup(&[("Only", format!("{}/feed", server.uri()))]).await;
    let mut agg = aggregator(&db);

    assert_eq!(agg.run_cycle().await.unwrap().inserted, 2);

    let again = agg.run_cycle().await.unwrap();
    assert_eq!(again.inserted, 0);
    assert!(again.duplicate_stop);
    assert_eq!(db.count_posts().await.unwrap(), 2);

    let stored = db.get_posts_for_feed(feeds[0].id).await.unwrap();
    let urls: Vec<&str> = stored.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["https://c.test/new", "https://c.test/old"]);
}

#[tokio::test]
async fn test_named_zone_and_zulu_dates_are_parsed() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/named",
        rss(&[item("named", "https://d.test/named", "Mon, 02 Jan 2006 15:04:05 MST")]),
    )
    .await;
    serve(
        &server,
        "/zulu",
        rss(&[
            item("zulu", "https://d.test/zulu", "Mon, 02 Jan 2006 15:04:05 Z"),
            item("offset", "https://d.test/offset", "Mon, 02 Jan 2006 15:04:05 +0200"),
        ]),
    )
    .await;

    let (db, feeds) = setup(&[
        ("Named", format!("{}/named", server.uri())),
        ("Zulu", format!("{}/zulu", server.uri())),
    ])
    .await;
    let mut agg = aggregator(&db);
    agg.run_cycle().await.unwrap();
    agg.run_cycle().await.unwrap();

    let named = db.get_posts_for_feed(feeds[0].id).await.unwrap();
    assert!(!is_zero(&named[0].published_at));
    assert_eq!(
        named[0].published_at,
        Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap()
    );

    let zulu = db.get_posts_for_feed(feeds[1].id).await.unwrap();
    assert_eq!(
        zulu[0].published_at,
        Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap()
    );
    assert_eq!(
        zulu[1].published_at,
        Utc.with_ymd_and_hms(2006, 1, 2, 13, 4, 5).unwrap()
    );
}

#[test]
fn test_interval_floor() {
    assert!(matches!(
        parse_interval("5s", MIN_INTERVAL),
        Err(AggregateError::IntervalTooShort(_))
    ));
    assert_eq!(
        parse_interval("10s", MIN_INTERVAL).unwrap(),
        Duration::from_secs(10)
    );
}

#[tokio::test]
async fn test_unparseable_date_stored_as_epoch() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/feed",
        rss(&[item("odd", "https://e.test/odd", "sometime last week")]),
    )
    .await;

    let (db, feeds) = setup(&[("Odd", format!("{}/feed", server.uri()))]).await;
    aggregator(&db).run_cycle().await.unwrap();

    let posts = db.get_posts_for_feed(feeds[0].id).await.unwrap();
    assert!(is_zero(&posts[0].published_at));
}

#[tokio::test]
async fn test_unescaped_text_is_persisted() {
    let server = MockServer::start().await;
    let body = r#"<rss version="2.0"><channel><title>t</title>
        <item>
            <title>Fish &amp;amp; Chips</title>
            <link>https://f.test/1</link>
            <description>&amp;lt;p&amp;gt;Crispy&amp;lt;/p&amp;gt;</description>
        </item>
    </channel></rss>"#;
    serve(&server, "/feed", body.to_string()).await;

    let (db, feeds) = setup(&[("Food", format!("{}/feed", server.uri()))]).await;
    aggregator(&db).run_cycle().await.unwrap();

    let posts = db.get_posts_for_feed(feeds[0].id).await.unwrap();
    assert_eq!(posts[0].title, "Fish & Chips");
    assert_eq!(posts[0].description, "<p>Crispy</p>");
}

// ============================================================================
// Selection
// ============================================================================

#[tokio::test]
async fn test_last_fetched_strictly_increases() {
    let server = MockServer::start().await;
    serve(&server, "/a", rss(&[])).await;
    serve(&server, "/b", rss(&[])).await;

    let (db, _) = setup(&[
        ("A", format!("{}/a", server.uri())),
        ("B", format!("{}/b", server.uri())),
    ])
    .await;
    let mut agg = aggregator(&db);

    let mut marks = Vec::new();
    for _ in 0..4 {
        let report = agg.run_cycle().await.unwrap();
        let feed = db.get_feed_by_url(&report.feed_url).await.unwrap();
        marks.push(feed.last_fetched_at.unwrap());
    }

    assert!(marks.windows(2).all(|w| w[0] < w[1]), "{marks:?}");
}

// ============================================================================
// Failure policy
// ============================================================================

#[tokio::test]
async fn test_fail_fast_stops_on_broken_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;
    serve(&server, "/good", rss(&[item("g", "https://g.test/1", DATE)])).await;

    let (db, _) = setup(&[
        ("Broken", format!("{}/broken", server.uri())),
        ("Good", format!("{}/good", server.uri())),
    ])
    .await;
    let mut agg = aggregator(&db).with_policy(FailurePolicy::FailFast);

    let (_tx, rx) = watch::channel(false);
    match agg.run(Duration::from_millis(10), rx).await {
        Err(AggregateError::Fetch { url, source }) => {
            assert!(url.ends_with("/broken"));
            assert!(matches!(source, FetchError::HttpStatus(404)));
        }
        other => panic!("Expected Fetch error, got {:?}", other),
    }
    assert_eq!(db.count_posts().await.unwrap(), 0);

    // The failing feed was still marked, so it no longer comes first
    let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
    assert_eq!(next.name, "Good");
}

#[tokio::test]
async fn test_skip_feed_keeps_ingesting_others() {
    let server = MockServer::start().await;
    serve(&server, "/broken", "definitely not xml <".to_string()).await;
    serve(&server, "/good", rss(&[item("g", "https://g.test/1", DATE)])).await;

    let (db, _) = setup(&[
        ("Broken", format!("{}/broken", server.uri())),
        ("Good", format!("{}/good", server.uri())),
    ])
    .await;
    let mut agg = aggregator(&db).with_policy(FailurePolicy::SkipFeed);

    let broken = agg.run_cycle().await.unwrap();
    assert!(broken.fetch_error.is_some());
    let good = agg.run_cycle().await.unwrap();
    assert_eq!(good.inserted, 1);
    assert_eq!(db.count_posts().await.unwrap(), 1);
}

// ============================================================================
// Loop lifecycle
// ============================================================================

#[tokio::test]
async fn test_run_without_feeds_is_rejected() {
    let (db, _) = setup(&[]).await;
    let (_tx, rx) = watch::channel(false);

    let result = aggregator(&db).run(Duration::from_secs(10), rx).await;
    assert!(matches!(result, Err(AggregateError::NoFeeds)));
}

#[tokio::test]
async fn test_cancellation_returns_summary() {
    let server = MockServer::start().await;
    serve(&server, "/a", rss(&[item("a", "https://h.test/a", DATE)])).await;
    serve(&server, "/b", rss(&[item("b", "https://h.test/b", DATE)])).await;

    let (db, _) = setup(&[
        ("A", format!("{}/a", server.uri())),
        ("B", format!("{}/b", server.uri())),
    ])
    .await;
    let mut agg = aggregator(&db);
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let summary = agg.run(Duration::from_millis(50), rx).await;
        (summary, agg)
    });

    // Both feeds get fetched within the first few cycles
    wait_for_posts(&db, 2).await;
    tx.send(true).unwrap();

    let (summary, agg) = handle.await.unwrap();
    let summary: RunSummary = summary.unwrap();

    assert!(summary.cycles >= 2, "{summary:?}");
    assert_eq!(summary.posts_inserted, 2);
    assert_eq!(summary.feeds_skipped, 0);
    assert_eq!(agg.phase(), gator::aggregator::Phase::Idle);
    assert_eq!(db.count_posts().await.unwrap(), 2);
}
