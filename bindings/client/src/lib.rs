mod api;
mod error;
mod model;
mod reqwest_transport;
mod scripted;
mod transport;

pub mod prelude {
    pub use crate::api::{ApiCall, ApiReply, BookingApiClient};
    pub use crate::error::{ApiError, ExtractionError, InvalidBaseUrl};
    pub use crate::model::{
        ClaimEntryData, ClaimEntryRequest, ClaimItem, ClaimLockData, ClaimLockRequest, Envelope,
        Gender, IdType, PaymentCallbackRequest, TicketData,
    };
    pub use crate::reqwest_transport::{ReqwestTransport, DEFAULT_REQUEST_TIMEOUT};
    pub use crate::scripted::{RecordedRequest, ScriptedReply, ScriptedTransport};
    pub use crate::transport::{
        Method, Transport, TransportError, TransportErrorKind, TransportRequest, TransportResponse,
    };
}
