//! Client for the KEPCO address and reference-number endpoints.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::transport::{HttpTransport, RemoteRequest, Transport};
use super::wire::{
    RemoteQuery, RemoteResponse, LEVEL_LIST_KEY, PATH_ADDR_GBN, PATH_ADDR_INIT,
    PROVINCE_LIST_KEY, SUBMISSION_ADDR_GBN, SUBMISSION_ADDR_INIT,
};
use crate::config::{Config, PreflightCall, ESB_URL_ENV};
use crate::error::{LookupError, LookupResult};
use crate::models::{AddressLevel, AddressSelection, OptionList};

const ACCEPT: &str = "application/json";
const CONTENT_TYPE: &str = "application/json; charset=\"UTF-8\"";

/// Turns address prefixes into next-level option lists.
pub struct KepcoClient<T = HttpTransport> {
    transport: T,
    base_url: Url,
    referer: String,
    user_agent: String,
    reference_url: Option<Url>,
    reference_submission_id: Option<String>,
    preflight: Vec<PreflightCall>,
    sentinel_levels: Vec<AddressLevel>,
}

impl KepcoClient<HttpTransport> {
    /// Create a client that talks HTTP using the configured timeout
    pub fn from_config(config: &Config) -> LookupResult<Self> {
        let transport = HttpTransport::new(Duration::from_secs(config.service.timeout_secs))?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> KepcoClient<T> {
    pub fn with_transport(config: &Config, transport: T) -> LookupResult<Self> {
        let base_url = parse_url(&config.service.base_url)?;
        let reference_url = config
            .reference_lookup
            .url
            .as_deref()
            .map(parse_url)
            .transpose()?;

        Ok(Self {
            transport,
            base_url,
            referer: config.service.referer.clone(),
            user_agent: config.service.user_agent.clone(),
            reference_url,
            reference_submission_id: config.reference_lookup.submission_id.clone(),
            preflight: config.preflight.clone(),
            sentinel_levels: config.cascade.sentinel_levels.clone(),
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn has_reference_lookup(&self) -> bool {
        self.reference_url.is_some()
    }

    pub fn has_preflight(&self) -> bool {
        !self.preflight.is_empty()
    }

    /// Run the configured handshake calls in order.
    ///
    /// Stops at the first failure; returns how many calls succeeded.
    pub async fn run_preflight(&self) -> LookupResult<usize> {
        for (i, call) in self.preflight.iter().enumerate() {
            let url = self.endpoint(&call.path)?;
            info!("Pre-flight call {} to {}", i + 1, url);
            let request = self.request(url, call.submission_id.as_deref(), call.body.clone());
            self.send(&request).await?;
        }
        Ok(self.preflight.len())
    }

    /// Fetch the province list from `retrieveAddrInit`
    pub async fn fetch_provinces(&self) -> LookupResult<OptionList> {
        let request = self.request(
            self.endpoint(PATH_ADDR_INIT)?,
            Some(SUBMISSION_ADDR_INIT),
            json!({}),
        );
        let response = self.send(&request).await?;

        let options = OptionList::normalize(response.field_values(
            PROVINCE_LIST_KEY,
            AddressLevel::Province.response_field(),
        ));
        if options.is_empty() {
            return Err(LookupError::EmptyResult(AddressLevel::Province));
        }

        debug!("Fetched {} provinces", options.len());
        Ok(options)
    }

    /// Fetch options for `level` using the ancestors held by `selection`
    pub async fn fetch_level_options(
        &self,
        level: AddressLevel,
        selection: &AddressSelection,
    ) -> LookupResult<OptionList> {
        let ancestors = selection
            .ancestors_of(level)
            .ok_or(LookupError::IncompleteAncestors(level))?;
        self.fetch_with_ancestors(level, &ancestors).await
    }

    /// Fetch options for `level` given the values of every level before it
    pub async fn fetch_with_ancestors(
        &self,
        level: AddressLevel,
        ancestors: &[String],
    ) -> LookupResult<OptionList> {
        if level == AddressLevel::Province {
            return self.fetch_provinces().await;
        }

        let query = RemoteQuery::new(level, ancestors)?;
        let request = self.request(
            self.endpoint(PATH_ADDR_GBN)?,
            Some(SUBMISSION_ADDR_GBN),
            serde_json::to_value(&query)?,
        );
        debug!("Fetching {} options (gbn={})", level, query.params.gbn);
        let response = self.send(&request).await?;

        let options =
            OptionList::normalize(response.field_values(LEVEL_LIST_KEY, level.response_field()));
        let inject = self.sentinel_levels.contains(&level);
        finish_options(level, options, inject)
    }

    /// Look up a record by its reference (computation) number.
    ///
    /// Fails with `NotConfigured` without touching the network when no lookup
    /// URL was configured.
    pub async fn lookup_by_reference_number(&self, reference: &str) -> LookupResult<RemoteResponse> {
        let url = self
            .reference_url
            .clone()
            .ok_or(LookupError::NotConfigured {
                feature: "reference number lookup",
                env_var: ESB_URL_ENV,
            })?;

        let request = self.request(
            url,
            self.reference_submission_id.as_deref(),
            json!({ "esbNo": reference.trim() }),
        );
        info!("Looking up reference number {}", reference.trim());
        self.send(&request).await
    }

    fn endpoint(&self, path: &str) -> LookupResult<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return parse_url(path);
        }
        self.base_url
            .join(path)
            .map_err(|e| LookupError::Config(format!("invalid endpoint path {}: {}", path, e)))
    }

    fn request(&self, url: Url, submission_id: Option<&str>, body: Value) -> RemoteRequest {
        let mut headers = vec![
            ("accept", ACCEPT.to_string()),
            ("content-type", CONTENT_TYPE.to_string()),
            ("referer", self.referer.clone()),
            ("user-agent", self.user_agent.clone()),
        ];
        if let Some(id) = submission_id {
            headers.push(("submissionid", id.to_string()));
        }
        RemoteRequest { url, headers, body }
    }

    async fn send(&self, request: &RemoteRequest) -> LookupResult<RemoteResponse> {
        let value = self.transport.post(request).await.map_err(|e| {
            warn!("Request to {} failed: {}", request.endpoint(), e);
            e
        })?;
        RemoteResponse::from_value(request.endpoint(), value)
    }
}

/// Apply the per-level empty-result policy.
///
/// Sentinel levels always end up non-empty with the "other region" entry
/// first. The terminal level returns an empty list as-is. Any other level
/// treats an empty list as `EmptyResult`.
pub fn finish_options(
    level: AddressLevel,
    options: OptionList,
    inject_sentinel: bool,
) -> LookupResult<OptionList> {
    if inject_sentinel && !level.is_terminal() {
        return Ok(options.with_other_region());
    }
    if options.is_empty() && !level.is_terminal() {
        return Err(LookupError::EmptyResult(level));
    }
    Ok(options)
}

fn parse_url(raw: &str) -> LookupResult<Url> {
    Url::parse(raw).map_err(|e| LookupError::Config(format!("invalid URL {}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kepco::testing::FakeTransport;
    use crate::models::OTHER_REGION;

    fn client(transport: FakeTransport) -> KepcoClient<FakeTransport> {
        KepcoClient::with_transport(&Config::default(), transport).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_provinces() {
        let transport = FakeTransport::replying(|_| {
            Ok(json!({"dlt_sido": [
                {"ADDR_DO": "서울특별시"},
                {"ADDR_DO": "강원특별자치도"},
                {"ADDR_DO": " 서울특별시 "}
            ]}))
        });
        let client = client(transport);

        let provinces = client.fetch_provinces().await.unwrap();
        assert_eq!(provinces.into_vec(), vec!["강원특별자치도", "서울특별시"]);

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(
            call.url.as_str(),
            "https://online.kepco.co.kr/ew/cpct/retrieveAddrInit"
        );
        assert_eq!(call.body, json!({}));
        assert_eq!(call.header("submissionid"), Some(SUBMISSION_ADDR_INIT));
        assert_eq!(call.header("accept"), Some("application/json"));
        assert_eq!(
            call.header("content-type"),
            Some("application/json; charset=\"UTF-8\"")
        );
        assert_eq!(
            call.header("referer"),
            Some("https://online.kepco.co.kr/EWM092D00")
        );
        assert_eq!(call.header("user-agent"), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_empty_provinces() {
        let client = client(FakeTransport::replying(|_| Ok(json!({"dlt_sido": []}))));
        let err = client.fetch_provinces().await.unwrap_err();
        assert!(matches!(err, LookupError::EmptyResult(AddressLevel::Province)));
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let client = client(FakeTransport::replying(|r| {
            Err(LookupError::UpstreamStatus {
                endpoint: r.endpoint().to_string(),
                status: 500,
            })
        }));
        let err = client.fetch_provinces().await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_sentinel_levels() {
        let client = client(FakeTransport::replying(|r| {
            let gbn = r.body["dma_addrGbn"]["gbn"].as_u64().unwrap();
            Ok(match gbn {
                0 => json!({"dlt_addrGbn": []}),
                _ => json!({"dlt_addrGbn": [{"ADDR_GU": "중구"}, {"ADDR_GU": "동구"}]}),
            })
        }));
        let seoul = AddressSelection::from_values([Some("서울특별시")]).unwrap();

        let cities = client
            .fetch_level_options(AddressLevel::City, &seoul)
            .await
            .unwrap();
        assert_eq!(cities.into_vec(), vec![OTHER_REGION]);

        let gu = client
            .fetch_with_ancestors(
                AddressLevel::District,
                &["서울특별시".to_string(), OTHER_REGION.to_string()],
            )
            .await
            .unwrap();
        assert_eq!(gu.into_vec(), vec![OTHER_REGION, "동구", "중구"]);

        let calls = client.transport().calls();
        assert_eq!(calls[1].header("submissionid"), Some(SUBMISSION_ADDR_GBN));
        assert!(calls[1].url.as_str().ends_with(PATH_ADDR_GBN));
    }

    #[tokio::test]
    async fn test_lot_options_are_raw() {
        let client = client(FakeTransport::replying(|_| {
            Ok(json!({"dlt_addrGbn": [
                {"ADDR_JIBUN": "10"}, {"ADDR_JIBUN": "2"}, {"ADDR_JIBUN": "산1"}
            ]}))
        }));
        let selection = AddressSelection::from_values(
            ["강원특별자치도", "강릉시", OTHER_REGION, "강동면", "모전리"].map(Some),
        )
        .unwrap();

        let lots = client
            .fetch_level_options(AddressLevel::Lot, &selection)
            .await
            .unwrap();
        assert_eq!(lots.into_vec(), vec!["2", "10", "산1"]);

        let calls = client.transport().calls();
        assert_eq!(
            calls[0].body,
            json!({"dma_addrGbn": {
                "gbn": 4, "addr_do": "강원특별자치도", "addr_si": "강릉시",
                "addr_gu": "-기타지역", "addr_lidong": "강동면", "addr_li": "모전리",
                "addr_jibun": ""
            }})
        );
    }

    #[tokio::test]
    async fn test_empty_lot_list_is_not_an_error() {
        let client = client(FakeTransport::replying(|_| Ok(json!({"dlt_addrGbn": []}))));
        let lots = client
            .fetch_with_ancestors(
                AddressLevel::Lot,
                &["a", "b", "c", "d", "e"].map(String::from),
            )
            .await
            .unwrap();
        assert!(lots.is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_ancestors() {
        let client = client(FakeTransport::replying(|_| Ok(json!({}))));
        let selection = AddressSelection::from_values([Some("서울특별시")]).unwrap();
        let err = client
            .fetch_level_options(AddressLevel::Town, &selection)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::IncompleteAncestors(AddressLevel::Town)));
        assert!(client.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn test_reference_lookup_not_configured() {
        let client = client(FakeTransport::replying(|_| Ok(json!({}))));
        assert!(!client.has_reference_lookup());
        let err = client
            .lookup_by_reference_number("123-456-7890")
            .await
            .unwrap_err();
        assert!(err.to_string().contains(ESB_URL_ENV));
        assert!(client.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn test_reference_lookup() {
        let mut config = Config::default();
        config.reference_lookup.url = Some("https://example.com/esb/search".to_string());
        let transport = FakeTransport::replying(|_| Ok(json!({"result": {"esbNo": "1"}})));
        let client = KepcoClient::with_transport(&config, transport).unwrap();

        let response = client.lookup_by_reference_number(" 123 ").await.unwrap();
        assert_eq!(response.as_map()["result"]["esbNo"], "1");

        let calls = client.transport().calls();
        assert_eq!(calls[0].url.as_str(), "https://example.com/esb/search");
        assert_eq!(calls[0].body, json!({"esbNo": "123"}));
        assert_eq!(calls[0].header("submissionid"), None);
    }

    #[tokio::test]
    async fn test_preflight_calls() {
        let mut config = Config::default();
        config.preflight = vec![
            PreflightCall {
                path: "/ew/cmmn/envCheck".to_string(),
                submission_id: Some("mf_sbm_envCheck".to_string()),
                body: json!({}),
            },
            PreflightCall {
                path: "https://sso.example.com/check".to_string(),
                submission_id: None,
                body: json!({"a": 1}),
            },
        ];
        let transport = FakeTransport::replying(|_| Ok(json!({})));
        let client = KepcoClient::with_transport(&config, transport).unwrap();

        assert_eq!(client.run_preflight().await.unwrap(), 2);
        let calls = client.transport().calls();
        assert_eq!(
            calls[0].url.as_str(),
            "https://online.kepco.co.kr/ew/cmmn/envCheck"
        );
        assert_eq!(calls[0].header("submissionid"), Some("mf_sbm_envCheck"));
        assert_eq!(calls[1].url.as_str(), "https://sso.example.com/check");
        assert_eq!(calls[1].body, json!({"a": 1}));
    }

    #[test]
    fn test_finish_options_without_sentinel() {
        let err = finish_options(AddressLevel::Town, OptionList::empty(), false).unwrap_err();
        assert!(err.is_empty_result());

        let lots = finish_options(AddressLevel::Lot, OptionList::empty(), true).unwrap();
        assert!(lots.is_empty());

        let towns = finish_options(AddressLevel::Town, OptionList::normalize(["가"]), false).unwrap();
        assert_eq!(towns.into_vec(), vec!["가"]);
    }
}
