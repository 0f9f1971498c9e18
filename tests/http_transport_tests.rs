use std::time::Duration;

use kepco_addr::config::Config;
use kepco_addr::models::OTHER_REGION;
use kepco_addr::{AddressLevel, AddressResolver, AddressSelection, Cascade, KepcoClient, LookupError};
use serde_json::json;
use wiremock::matchers::{any, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.service.base_url = server.uri();
    config
}

fn resolver_for(config: &Config) -> AddressResolver {
    AddressResolver::new(KepcoClient::from_config(config).unwrap())
}

// ── Address endpoints ───────────────────────────────────────────

#[tokio::test]
async fn provinces_send_required_headers_and_are_memoized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ew/cpct/retrieveAddrInit"))
        .and(header("accept", "application/json"))
        .and(header("content-type", "application/json; charset=\"UTF-8\""))
        .and(header("referer", "https://online.kepco.co.kr/EWM092D00"))
        .and(header("user-agent", "Mozilla/5.0"))
        .and(header("submissionid", "mf_wfm_layout_sbm_retrieveAddrInit"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dlt_sido": [{"ADDR_DO": "서울특별시"}, {"ADDR_DO": "강원특별자치도"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver_for(&config_for(&server));
    let first = resolver.provinces().await.unwrap();
    let second = resolver.provinces().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.into_vec(), vec!["강원특별자치도", "서울특별시"]);
}

#[tokio::test]
async fn lot_request_carries_every_ancestor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ew/cpct/retrieveAddrGbn"))
        .and(header("submissionid", "mf_wfm_layout_sbm_retrieveAddrGbn"))
        .and(body_json(json!({"dma_addrGbn": {
            "gbn": 4,
            "addr_do": "강원특별자치도",
            "addr_si": "강릉시",
            "addr_gu": "-기타지역",
            "addr_lidong": "강동면",
            "addr_li": "모전리",
            "addr_jibun": ""
        }})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dlt_addrGbn": [{"ADDR_JIBUN": "10"}, {"ADDR_JIBUN": "2"}, {"ADDR_JIBUN": "1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = KepcoClient::from_config(&config_for(&server)).unwrap();
    let selection = AddressSelection::from_values(
        ["강원특별자치도", "강릉시", OTHER_REGION, "강동면", "모전리"].map(Some),
    )
    .unwrap();

    let lots = client
        .fetch_level_options(AddressLevel::Lot, &selection)
        .await
        .unwrap();
    assert_eq!(lots.into_vec(), vec!["1", "2", "10"]);
}

#[tokio::test]
async fn empty_intermediate_level_yields_other_region() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ew/cpct/retrieveAddrGbn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dlt_addrGbn": []})))
        .mount(&server)
        .await;

    let client = KepcoClient::from_config(&config_for(&server)).unwrap();
    let gu = client
        .fetch_with_ancestors(
            AddressLevel::District,
            &["세종특별자치시".to_string(), "세종시".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(gu.into_vec(), vec![OTHER_REGION]);
}

// ── Failures ────────────────────────────────────────────────────

#[tokio::test]
async fn non_success_status_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let resolver = resolver_for(&config_for(&server));
    let err = resolver.provinces().await.unwrap_err();
    assert!(err.is_upstream());
    assert!(matches!(err, LookupError::UpstreamStatus { status: 500, .. }));
    assert!(resolver.is_empty().await);
}

#[tokio::test]
async fn invalid_json_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = KepcoClient::from_config(&config_for(&server)).unwrap();
    let err = client.fetch_provinces().await.unwrap_err();
    assert!(matches!(err, LookupError::Upstream { .. }));
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"dlt_sido": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.service.timeout_secs = 1;
    let client = KepcoClient::from_config(&config).unwrap();
    let err = client.fetch_provinces().await.unwrap_err();
    assert!(matches!(err, LookupError::Upstream { .. }));
}

#[tokio::test]
async fn cascade_records_failure_without_losing_ancestors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ew/cpct/retrieveAddrInit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dlt_sido": [{"ADDR_DO": "강원특별자치도"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ew/cpct/retrieveAddrGbn"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let resolver = resolver_for(&config_for(&server));
    let mut cascade = Cascade::new();
    cascade.refresh(&resolver).await.unwrap();
    cascade
        .select(AddressLevel::Province, "강원특별자치도")
        .unwrap();

    assert!(cascade.refresh(&resolver).await.is_err());
    assert_eq!(
        cascade.selection().get(AddressLevel::Province),
        Some("강원특별자치도")
    );
    assert!(cascade.error(AddressLevel::City).is_some());
    assert!(cascade.options(AddressLevel::City).is_none());
}

// ── Reference number lookup ─────────────────────────────────────

#[tokio::test]
async fn reference_lookup_posts_esb_number() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ew/cpct/retrieveByEsbNo"))
        .and(header("content-type", "application/json; charset=\"UTF-8\""))
        .and(body_json(json!({"esbNo": "123-456-7890"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dlt_result": [{"ESB_NO": "123-456-7890"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.reference_lookup.url = Some(format!("{}/ew/cpct/retrieveByEsbNo", server.uri()));
    let resolver = resolver_for(&config);

    let response = resolver
        .lookup_by_reference_number("123-456-7890")
        .await
        .unwrap();
    assert_eq!(
        response.into_value(),
        json!({"dlt_result": [{"ESB_NO": "123-456-7890"}]})
    );
}

#[tokio::test]
async fn reference_lookup_without_url_never_calls_out() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = resolver_for(&config_for(&server));
    let err = resolver
        .lookup_by_reference_number("123")
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::NotConfigured { .. }));
    assert!(err.to_string().contains("KEPCO_ESB_SEARCH_URL"));
}
