//! End-to-end tests for the crawl engine against tiny in-process HTTP
//! servers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use scuttle::{CrawlerBuilder, Output, QueueDiscipline, Request, Response, Spider, crawl_with};
use scuttle::{CrawlError, CrawlerConfig};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Makes the engine's log lines visible under `RUST_LOG` when a test
/// fails. Safe to call from every test; only the first call installs the
/// subscriber.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A minimal HTTP/1.1 server that records the path of every request it
/// sees, tracks how many are being served at once, and answers each with
/// the same canned HTML body.
struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
    max_in_flight: Arc<AtomicUsize>,
}

impl TestServer {
    async fn spawn(body: &'static str, delay: Duration) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let hits_srv = Arc::clone(&hits);
        let max_srv = Arc::clone(&max_in_flight);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let hits = Arc::clone(&hits_srv);
                let in_flight = Arc::clone(&in_flight);
                let max_in_flight = Arc::clone(&max_srv);
                tokio::spawn(async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(current, Ordering::SeqCst);

                    let mut buf = vec![0u8; 4096];
                    let mut read = 0;
                    loop {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => read += n,
                        }
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
                            break;
                        }
                    }
                    let head = String::from_utf8_lossy(&buf[..read]).into_owned();
                    let path = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    hits.lock().push(path);

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        TestServer {
            addr,
            hits,
            max_in_flight,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().clone()
    }
}

/// An address nothing listens on, for provoking connection failures.
async fn refused_addr() -> SocketAddr {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn noop_request(url: &str) -> Request<Value> {
    Request::get(url)
        .unwrap()
        .with_callback(|_response| Ok(Vec::new()))
}

#[tokio::test]
async fn fifo_runs_seeds_in_submission_order() {
    let server = TestServer::spawn("<html></html>", Duration::ZERO).await;
    let crawler = CrawlerBuilder::<Value>::new()
        .concurrent_requests(1)
        .discipline(QueueDiscipline::Fifo)
        .build()
        .unwrap();
    for path in ["/a", "/b", "/c"] {
        crawler.add_request(noop_request(&server.url(path)));
    }

    crawler.run().await.unwrap();
    assert_eq!(server.hits(), vec!["/a", "/b", "/c"]);
}

#[tokio::test]
async fn lifo_runs_seeds_in_reverse_order() {
    let server = TestServer::spawn("<html></html>", Duration::ZERO).await;
    let crawler = CrawlerBuilder::<Value>::new()
        .concurrent_requests(1)
        .discipline(QueueDiscipline::Lifo)
        .build()
        .unwrap();
    for path in ["/a", "/b", "/c"] {
        crawler.add_request(noop_request(&server.url(path)));
    }

    crawler.run().await.unwrap();
    assert_eq!(server.hits(), vec!["/c", "/b", "/a"]);
}

#[tokio::test]
async fn lifo_fetches_derived_requests_before_older_seeds() {
    let server = TestServer::spawn("<html></html>", Duration::ZERO).await;
    let crawler = CrawlerBuilder::<Value>::new()
        .concurrent_requests(1)
        .discipline(QueueDiscipline::Lifo)
        .build()
        .unwrap();
    crawler.add_request(noop_request(&server.url("/a")));
    crawler.add_request(noop_request(&server.url("/b")));
    crawler.add_request(
        Request::get(&server.url("/c"))
            .unwrap()
            .with_callback(|response| {
                Ok(vec![Output::request(
                    response
                        .follow("/c-child")?
                        .with_callback(|_| Ok(Vec::new())),
                )])
            }),
    );

    crawler.run().await.unwrap();
    // Depth-first: the request discovered while fetching /c jumps ahead
    // of the older pending seeds.
    assert_eq!(server.hits(), vec!["/c", "/c-child", "/b", "/a"]);
}

#[tokio::test]
async fn in_flight_fetches_never_exceed_the_concurrency_limit() {
    let server = TestServer::spawn("<html></html>", Duration::from_millis(50)).await;
    let crawler = CrawlerBuilder::<Value>::new()
        .concurrent_requests(2)
        .build()
        .unwrap();
    for path in ["/1", "/2", "/3", "/4", "/5", "/6"] {
        crawler.add_request(noop_request(&server.url(path)));
    }

    crawler.run().await.unwrap();
    assert_eq!(server.hits().len(), 6);
    assert!(server.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn transient_failures_are_retried_then_dropped() {
    let addr = refused_addr().await;
    let parsed = Arc::new(AtomicUsize::new(0));
    let parsed_in_callback = Arc::clone(&parsed);
    let sunk = Arc::new(AtomicUsize::new(0));
    let sunk_in_sink = Arc::clone(&sunk);

    let crawler = CrawlerBuilder::<Value>::new()
        .concurrent_requests(1)
        .max_retries(2)
        .result_sink(move |_| {
            sunk_in_sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();
    crawler.add_request(
        Request::get(&format!("http://{}/", addr))
            .unwrap()
            .with_timeout(Duration::from_secs(1))
            .with_callback(move |_response| {
                parsed_in_callback.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }),
    );

    crawler.run().await.unwrap();

    let stats = crawler.stats().snapshot();
    assert_eq!(stats.requests_sent, 3, "one attempt plus two retries");
    assert_eq!(stats.requests_retried, 2);
    assert_eq!(stats.requests_dropped, 1);
    assert_eq!(stats.requests_succeeded, 0);
    assert_eq!(parsed.load(Ordering::SeqCst), 0);
    assert_eq!(sunk.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn callback_outputs_fan_out_to_queue_and_sink() {
    let server = TestServer::spawn("<html></html>", Duration::ZERO).await;
    let items = Arc::new(Mutex::new(Vec::new()));
    let items_in_sink = Arc::clone(&items);

    let crawler = CrawlerBuilder::<Value>::new()
        .discipline(QueueDiscipline::Fifo)
        .result_sink(move |item| {
            items_in_sink.lock().push(item);
            Ok(())
        })
        .build()
        .unwrap();
    crawler.add_request(
        Request::get(&server.url("/start"))
            .unwrap()
            .with_callback(|response| {
                Ok(vec![
                    Output::request(
                        response.follow("/left")?.with_callback(|_| Ok(Vec::new())),
                    ),
                    Output::request(
                        response.follow("/right")?.with_callback(|_| Ok(Vec::new())),
                    ),
                    Output::item(json!({ "hello": "world" })),
                ])
            }),
    );

    crawler.run().await.unwrap();

    let mut hits = server.hits();
    hits.sort();
    assert_eq!(hits, vec!["/left", "/right", "/start"]);
    let items = items.lock();
    assert_eq!(items.as_slice(), &[json!({ "hello": "world" })]);
}

#[tokio::test]
async fn callback_errors_do_not_affect_sibling_requests() {
    let server = TestServer::spawn("<html></html>", Duration::ZERO).await;
    let items = Arc::new(Mutex::new(Vec::new()));
    let items_in_sink = Arc::clone(&items);

    let crawler = CrawlerBuilder::<Value>::new()
        .concurrent_requests(2)
        .result_sink(move |item| {
            items_in_sink.lock().push(item);
            Ok(())
        })
        .build()
        .unwrap();
    crawler.add_request(
        Request::get(&server.url("/bad"))
            .unwrap()
            .with_callback(|_response| anyhow::bail!("parser blew up")),
    );
    crawler.add_request(
        Request::get(&server.url("/good"))
            .unwrap()
            .with_callback(|response| {
                Ok(vec![Output::item(json!(response.url().path()))])
            }),
    );

    crawler.run().await.unwrap();
    assert_eq!(items.lock().as_slice(), &[json!("/good")]);
}

#[tokio::test]
async fn sink_errors_do_not_stall_the_crawl() {
    let server = TestServer::spawn("<html></html>", Duration::ZERO).await;
    let crawler = CrawlerBuilder::<Value>::new()
        .result_sink(|_| anyhow::bail!("sink rejected the item"))
        .build()
        .unwrap();
    for path in ["/a", "/b"] {
        crawler.add_request(
            Request::get(&server.url(path))
                .unwrap()
                .with_callback(|response| Ok(vec![Output::item(json!(response.url().path()))])),
        );
    }

    crawler.run().await.unwrap();
    let stats = crawler.stats().snapshot();
    assert_eq!(stats.results_crawled, 2);
    assert_eq!(stats.requests_succeeded, 2);
}

#[tokio::test]
async fn download_delay_spaces_out_sequential_fetches() {
    let server = TestServer::spawn("<html></html>", Duration::ZERO).await;
    let crawler = CrawlerBuilder::<Value>::new()
        .concurrent_requests(1)
        .download_delay(Duration::from_millis(100))
        .build()
        .unwrap();
    crawler.add_request(noop_request(&server.url("/a")));
    crawler.add_request(noop_request(&server.url("/b")));

    let started = Instant::now();
    crawler.run().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
}

struct PageSpider {
    base: String,
    visited: Arc<Mutex<Vec<String>>>,
}

impl Spider for PageSpider {
    type Item = String;

    fn start_requests(&self) -> Result<Vec<Request<String>>, CrawlError> {
        Ok(vec![Request::get(&format!("{}/start", self.base))?])
    }

    fn parse(&self, response: Response) -> anyhow::Result<Vec<Output<String>>> {
        let mut outputs = vec![Output::item(response.url().path().to_string())];
        if response.url().path() == "/start" {
            outputs.push(Output::request(response.follow("/next")?));
        }
        Ok(outputs)
    }

    fn process_result(&self, item: String) -> anyhow::Result<()> {
        self.visited.lock().push(item);
        Ok(())
    }
}

#[tokio::test]
async fn spider_drives_a_full_crawl() {
    let server = TestServer::spawn("<html></html>", Duration::ZERO).await;
    let visited = Arc::new(Mutex::new(Vec::new()));
    let spider = PageSpider {
        base: format!("http://{}", server.addr),
        visited: Arc::clone(&visited),
    };

    crawl_with(spider, CrawlerConfig::default()).await.unwrap();

    let mut visited = visited.lock().clone();
    visited.sort();
    assert_eq!(visited, vec!["/next", "/start"]);
}
