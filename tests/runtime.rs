use conformance::config::Config;
use conformance::expect::{any_of, expect, header, responses};
use conformance::http::request;
use conformance::testing::{CaseStatus, Runner, Suite, TestCase};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn runner(server: &MockServer) -> Runner {
    runner_with(server, Vec::new())
}

fn runner_with(server: &MockServer, skips: Vec<String>) -> Runner {
    let config = Config {
        gateway_url: server.uri(),
        skips,
        timeout_secs: 5,
        ..Config::default()
    };
    Runner::new(&config).unwrap()
}

async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn matching_response_passes() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/ipfs/bafy/hello.txt",
        ResponseTemplate::new(200)
            .insert_header("Etag", "\"bafy\"")
            .set_body_raw("hello\n", "text/plain; charset=utf-8"),
    )
    .await;

    let case = TestCase::new("GET hello")
        .request(request().path("/ipfs/bafy/hello.txt"))
        .response(
            expect()
                .status(200)
                .header(header("Content-Type").contains("text/plain"))
                .header(header("Etag").equals("\"bafy\""))
                .header(header("X-Debug").not().exists())
                .body("hello\n"),
        );

    let result = runner(&server).run_case("TestPlain/GET hello", &case).await;
    assert_eq!(result.status, CaseStatus::Passed, "{:?}", result.reports);
    assert_eq!(result.assertions.len(), 5);
    assert!(result.reports.is_empty());
}

#[tokio::test]
async fn every_mismatch_is_reported_at_once() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/ipfs/bafy/missing",
        ResponseTemplate::new(404).set_body_raw("not found", "text/html"),
    )
    .await;

    let case = TestCase::new("GET missing")
        .hint("the file exists in the fixture")
        .request(request().path("/ipfs/bafy/missing"))
        .response(
            expect()
                .status(200)
                .header(header("Content-Type").equals("text/plain").hint("served as text"))
                .header(header("Etag").exists())
                .body("hello\n"),
        );

    let result = runner(&server).run_case("TestPlain/GET missing", &case).await;
    assert_eq!(result.status, CaseStatus::Failed);

    let failures: Vec<&str> = result
        .assertions
        .iter()
        .filter(|a| !a.passed())
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(failures, vec!["Status code", "Header Content-Type", "Header Etag", "Body"]);

    assert_eq!(result.reports.len(), 1);
    let report = result.reports[0].to_string();
    assert!(report.contains("Hint: the file exists in the fixture"));
    assert!(report.contains("Status code is not 200. It is 404"));
    assert!(report.contains("Header 'Content-Type' expected 'text/plain', got 'text/html' (served as text)"));
    assert!(report.contains("HTTP/1.1 404 Not Found"));
    assert!(report.contains("not found"));
}

#[tokio::test]
async fn url_and_path_together_never_reach_the_network() {
    let server = MockServer::start().await;
    let url = format!("{}/ipfs/bafy", server.uri());
    let case = TestCase::new("both").request(request().url(url).path("/ipfs/bafy"));

    let result = runner(&server).run_case("TestA/both", &case).await;
    assert_eq!(result.status, CaseStatus::Failed);
    assert_eq!(
        result.reports[0].error.as_deref(),
        Some("both 'url' and 'path' are set")
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn identical_payloads_pass() {
    let server = MockServer::start().await;
    for route in ["/ipfs/bafy/a", "/ipfs/bafy/b", "/ipfs/bafy/c"] {
        serve(&server, route, ResponseTemplate::new(200).set_body_string("same")).await;
    }

    let case = TestCase::new("same bytes")
        .requests([
            request().path("/ipfs/bafy/a"),
            request().path("/ipfs/bafy/b"),
            request().path("/ipfs/bafy/c"),
        ])
        .response(expect().status(200))
        .responses(responses().have_the_same_payload());

    let result = runner(&server).run_case("TestA/same", &case).await;
    assert_eq!(result.status, CaseStatus::Passed, "{:?}", result.reports);
    let names: Vec<&str> = result.assertions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Request 1/Status code",
            "Request 2/Status code",
            "Request 3/Status code",
            "Payloads"
        ]
    );
}

#[tokio::test]
async fn one_byte_difference_fails_with_a_diff() {
    let server = MockServer::start().await;
    serve(&server, "/a", ResponseTemplate::new(200).set_body_string("payload-1")).await;
    serve(&server, "/b", ResponseTemplate::new(200).set_body_string("payload-2")).await;

    let case = TestCase::new("differs")
        .requests([request().path("/a"), request().path("/b")])
        .responses(responses().have_the_same_payload());

    let result = runner(&server).run_case("TestA/differs", &case).await;
    assert_eq!(result.status, CaseStatus::Failed);
    let error = result.reports[0].error.clone().unwrap();
    assert!(error.starts_with("Responses are not equal"));
    assert!(error.contains("payload-1"));
    assert!(error.contains("==== Request 2 ====\n\npayload-2"));
}

#[tokio::test]
async fn redirects_are_not_followed_by_default() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/ipfs/bafy/dir",
        ResponseTemplate::new(301).insert_header("Location", "/ipfs/bafy/dir/"),
    )
    .await;
    serve(&server, "/ipfs/bafy/dir/", ResponseTemplate::new(200).set_body_string("index")).await;

    let runner = runner(&server);
    let redirect = TestCase::new("redirect")
        .request(request().path("/ipfs/bafy/dir"))
        .response(expect().status(301).header(header("Location").equals("/ipfs/bafy/dir/")));
    let result = runner.run_case("TestA/redirect", &redirect).await;
    assert_eq!(result.status, CaseStatus::Passed, "{:?}", result.reports);

    let followed = TestCase::new("followed")
        .request(request().path("/ipfs/bafy/dir").follow_redirects())
        .response(expect().status(200).body("index"));
    let result = runner.run_case("TestA/followed", &followed).await;
    assert_eq!(result.status, CaseStatus::Passed, "{:?}", result.reports);
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/slow",
        ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)),
    )
    .await;

    let config = Config {
        gateway_url: server.uri(),
        timeout_secs: 1,
        ..Config::default()
    };
    let case = TestCase::new("slow")
        .request(request().path("/slow"))
        .response(expect().status(200));

    let result = Runner::new(&config).unwrap().run_case("TestA/slow", &case).await;
    assert_eq!(result.status, CaseStatus::Failed);
    let reason = result.assertions[0].outcome.reason.clone().unwrap();
    assert!(reason.contains("timed out after 1000ms"), "{reason}");
}

#[tokio::test]
async fn transport_failures_only_fail_their_request() {
    let server = MockServer::start().await;
    serve(&server, "/ok", ResponseTemplate::new(200).set_body_string("ok")).await;

    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = format!("http://{}/gone", closed.local_addr().unwrap());
    drop(closed);

    let case = TestCase::new("mixed")
        .requests([request().url(dead), request().path("/ok")])
        .response(expect().status(200));

    let result = runner(&server).run_case("TestA/mixed", &case).await;
    assert_eq!(result.status, CaseStatus::Failed);
    assert_eq!(result.assertions[0].name, "Request 1/Request");
    assert!(!result.assertions[0].passed());
    assert_eq!(result.assertions[1].name, "Request 2/Status code");
    assert!(result.assertions[1].passed());
    assert!(result.reports[0].actual_request.is_some());
    assert!(result.reports[0].actual_response.is_none());
}

#[tokio::test]
async fn any_of_accepts_either_answer() {
    let server = MockServer::start().await;
    serve(&server, "/range", ResponseTemplate::new(200).set_body_string("0123456789")).await;

    let case = TestCase::new("range")
        .request(request().path("/range").header("Range", "bytes=1-3"))
        .response(any_of([
            expect().status(206).body("123"),
            expect().status(200).body("0123456789"),
        ]));

    let result = runner(&server).run_case("TestA/range", &case).await;
    assert_eq!(result.status, CaseStatus::Passed, "{:?}", result.reports);
}

#[tokio::test]
async fn hooks_shape_requests_and_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/signed"))
        .and(wiremock::matchers::header("x-signature", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  padded  "))
        .mount(&server)
        .await;

    let case = TestCase::new("hooked")
        .request(request().path("/signed"))
        .before_request("sign", |wire| {
            wire.headers.insert("x-signature", "abc".parse().map_err(|_| "bad value")?);
            Ok(())
        })
        .after_response("trim", |res| {
            let trimmed = String::from_utf8_lossy(&res.body).trim().to_string();
            res.body = trimmed.into();
            Ok(())
        })
        .response(expect().status(200).body("padded"));

    let result = runner(&server).run_case("TestA/hooked", &case).await;
    assert_eq!(result.status, CaseStatus::Passed, "{:?}", result.reports);
}

#[tokio::test]
async fn suites_skip_by_hierarchical_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/skipped"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let suite = Suite::new("TestGateway").cases([
        TestCase::new("Car/GET_1")
            .request(request().path("/skipped"))
            .response(expect().status(200)),
        TestCase::new("Car/GET_2")
            .request(request().path("/skipped"))
            .response(expect().status(200)),
        TestCase::new("Tar/GET")
            .request(request().path("/run"))
            .response(expect().status(200)),
    ]);

    let report = runner_with(&server, vec![r"Test.*/Car/GET_\d+".to_string()])
        .run_suite(&suite)
        .await;

    assert_eq!((report.passed, report.failed, report.skipped), (1, 0, 2));
    assert!(report.success());
    assert_eq!(report.results[2].name, "TestGateway/Tar/GET");
}
