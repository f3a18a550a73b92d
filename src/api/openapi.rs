//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::dto::{
    CustomerLoginRequest, CustomerLoginResponse, FeedbackRequest, FeedbackResponse,
    RoomCatalogDto, RoomStatusResponse, SiteCatalogDto, TakeTicketRequest, TakeTicketResponse,
    WaitingListResponse,
};
use super::handlers::{public, staff, system, tv};
use crate::domain::{LoyaltyTier, MyTicketView, RoomStatus, SiteStatus, TicketNumber, TicketStatus};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI specification.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "queue-gateway",
        description = "Walk-in queue tickets, staff controls and live room status."
    ),
    paths(
        public::list_sites,
        public::login_customer,
        public::room_status,
        public::take_ticket,
        public::complete_ticket,
        public::submit_feedback,
        staff::waiting_list,
        staff::call_next,
        staff::complete_current,
        staff::skip_current,
        tv::site_status,
        system::health_handler,
    ),
    components(schemas(
        SiteCatalogDto,
        RoomCatalogDto,
        CustomerLoginRequest,
        CustomerLoginResponse,
        FeedbackRequest,
        FeedbackResponse,
        TakeTicketRequest,
        TakeTicketResponse,
        RoomStatusResponse,
        WaitingListResponse,
        RoomStatus,
        SiteStatus,
        MyTicketView,
        TicketNumber,
        TicketStatus,
        LoyaltyTier,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Public", description = "Customer-facing queue endpoints"),
        (name = "Staff", description = "Queue controls for room staff"),
        (name = "TV", description = "Display board feed"),
        (name = "System", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_queue_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/public/sites/{site}/rooms/{room}/tickets"));
        assert!(doc.paths.paths.contains_key("/api/staff/sites/{site}/rooms/{room}/call-next"));
        assert!(doc.paths.paths.contains_key("/health"));
    }
}
