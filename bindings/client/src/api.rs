use std::sync::Arc;
use std::time::Duration;

use gangway_instruments::{OperationRecord, Reporter};
use serde::Serialize;
use url::Url;

use crate::error::{ApiError, InvalidBaseUrl};
use crate::model::{
    ClaimEntryData, ClaimEntryRequest, ClaimLockData, ClaimLockRequest, Extract,
    PaymentCallbackRequest,
};
use crate::transport::{Method, Transport, TransportRequest};

/// A successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply<T> {
    pub status: u16,
    pub data: T,
}

/// The record of one request, whether or not it succeeded.
#[derive(Debug)]
pub struct ApiCall<T> {
    /// Method and path, for diagnostics. For example `POST /v1/claim/entry/abc`.
    pub endpoint: String,
    pub latency: Duration,
    pub result: Result<ApiReply<T>, ApiError>,
}

/// Typed client for the booking API.
///
/// Every request is recorded with the reporter as an `http_req` operation tagged with the step
/// name, which produces the `http_req_duration`, `http_req_duration{step:<step>}` and
/// `http_req_failed` metrics. `http_reqs` counts a pass for every response received and a fail
/// for every transport error.
#[derive(Clone)]
pub struct BookingApiClient {
    base_url: Url,
    transport: Arc<dyn Transport>,
    reporter: Arc<Reporter>,
}

impl std::fmt::Debug for BookingApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl BookingApiClient {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn Transport>,
        reporter: Arc<Reporter>,
    ) -> Result<Self, InvalidBaseUrl> {
        let parsed = Url::parse(base_url).map_err(|source| InvalidBaseUrl::Parse {
            url: base_url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(InvalidBaseUrl::Scheme(base_url.to_string()));
        }

        Ok(Self {
            base_url: parsed,
            transport,
            reporter,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /v1/schedules`, expects 200.
    pub async fn list_schedules(&self) -> ApiCall<()> {
        self.get("schedules", &["v1", "schedules"], 200).await
    }

    /// `GET /v1/schedule/{id}`, expects 200.
    pub async fn get_schedule(&self, schedule_id: u32) -> ApiCall<()> {
        let schedule_id = schedule_id.to_string();
        self.get("schedule_detail", &["v1", "schedule", &schedule_id], 200)
            .await
    }

    /// `POST /v1/claim/lock`, expects 201 and a session id.
    pub async fn claim_lock(&self, request: &ClaimLockRequest) -> ApiCall<ClaimLockData> {
        self.post("claim_lock", &["v1", "claim", "lock"], request, 201).await
    }

    /// `POST /v1/claim/entry/{session_id}`, expects 200 and an order id.
    pub async fn claim_entry(
        &self,
        session_id: &str,
        request: &ClaimEntryRequest,
    ) -> ApiCall<ClaimEntryData> {
        self.post("claim_entry", &["v1", "claim", "entry", session_id], request, 200).await
    }

    /// `POST /v1/payment/callback`, expects 200.
    pub async fn payment_callback(&self, request: &PaymentCallbackRequest) -> ApiCall<()> {
        self.post("payment_callback", &["v1", "payment", "callback"], request, 200).await
    }

    /// `GET /v1/booking/order/{order_id}`, expects 200.
    pub async fn get_booking(&self, order_id: &str) -> ApiCall<()> {
        self.get("get_booking", &["v1", "booking", "order", order_id], 200)
            .await
    }

    fn endpoint_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Only fails for cannot-be-a-base URLs, which `new` rejects.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: Extract>(
        &self,
        step: &str,
        segments: &[&str],
        expected_status: u16,
    ) -> ApiCall<T> {
        self.call(step, Method::Get, segments, None, expected_status)
            .await
    }

    /// A body that cannot be encoded is reported as a failed call and nothing is sent.
    async fn post<T: Extract, B: Serialize>(
        &self,
        step: &str,
        segments: &[&str],
        request: &B,
        expected_status: u16,
    ) -> ApiCall<T> {
        match serde_json::to_value(request) {
            Ok(body) => {
                self.call(step, Method::Post, segments, Some(body), expected_status)
                    .await
            }
            Err(e) => ApiCall {
                endpoint: endpoint_name(Method::Post, segments),
                latency: Duration::ZERO,
                result: Err(ApiError::Encode(e)),
            },
        }
    }

    async fn call<T: Extract>(
        &self,
        step: &str,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
        expected_status: u16,
    ) -> ApiCall<T> {
        let endpoint = endpoint_name(method, segments);
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        let request = TransportRequest {
            method,
            url: self.endpoint_url(segments),
            body,
            headers,
        };

        let mut operation_record = OperationRecord::new("http_req").with_attr("step", step);
        let response = self.transport.request(request).await;
        let latency = match &response {
            Ok(response) => operation_record.finish_with(response.latency, response.status >= 400),
            Err(_) => operation_record.finish(true),
        };
        self.reporter.add_operation(&operation_record);
        self.reporter.record_check("http_reqs", response.is_ok());

        let result = match response {
            Err(e) => Err(ApiError::Transport(e)),
            Ok(response) if response.status != expected_status => Err(ApiError::UnexpectedStatus {
                status: response.status,
                expected: expected_status,
                body: response.body,
            }),
            Ok(response) => match T::extract(&response.body) {
                Ok(data) => Ok(ApiReply {
                    status: response.status,
                    data,
                }),
                Err(source) => Err(ApiError::Extraction {
                    status: response.status,
                    body: response.body,
                    source,
                }),
            },
        };

        if let Err(e) = &result {
            log::trace!("{endpoint} failed: {e}");
        }

        ApiCall {
            endpoint,
            latency,
            result,
        }
    }
}

fn endpoint_name(method: Method, segments: &[&str]) -> String {
    format!("{method} /{}", segments.join("/"))
}
