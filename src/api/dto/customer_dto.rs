//! Customer login and feedback DTOs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::loyalty::free_credits;
use crate::domain::{Customer, CustomerId, Feedback, FeedbackId, LoyaltyTier, TicketId};

/// Request body for `POST /api/public/customers/login`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerLoginRequest {
    /// Phone number; surrounding whitespace is ignored.
    pub phone: String,
    /// Date of birth (`YYYY-MM-DD`).
    pub date_of_birth: NaiveDate,
}

/// Response body for a customer login.
#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerLoginResponse {
    /// Customer identifier, to pass when taking a ticket.
    pub customer_id: CustomerId,
    /// Normalized phone number.
    pub phone: String,
    /// Loyalty points.
    pub points: i32,
    /// Free credits earned (one per five points).
    pub free_credits: i32,
    /// Loyalty tier.
    pub tier: LoyaltyTier,
}

impl From<Customer> for CustomerLoginResponse {
    fn from(customer: Customer) -> Self {
        Self {
            customer_id: customer.id,
            free_credits: free_credits(customer.points),
            tier: LoyaltyTier::for_points(customer.points),
            points: customer.points,
            phone: customer.phone,
        }
    }
}

/// Request body for `POST /api/public/tickets/{id}/feedback`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct FeedbackRequest {
    /// Rating from 1 to 5.
    pub stars: i32,
    /// Optional free-text comment.
    #[serde(default)]
    pub comment: Option<String>,
}

/// Response body for a feedback submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct FeedbackResponse {
    /// Stored feedback id; identical on retries.
    pub feedback_id: FeedbackId,
    /// Rated ticket.
    pub ticket_id: TicketId,
}

impl From<Feedback> for FeedbackResponse {
    fn from(feedback: Feedback) -> Self {
        Self {
            feedback_id: feedback.id,
            ticket_id: feedback.ticket_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn login_response_derives_tier_and_credits() {
        let customer = Customer {
            id: CustomerId::new(),
            phone: "0900".to_string(),
            date_of_birth: NaiveDate::default(),
            points: 23,
            created_at: Utc::now(),
        };
        let response = CustomerLoginResponse::from(customer);
        assert_eq!(response.free_credits, 4);
        assert_eq!(response.tier, LoyaltyTier::Vip);
    }

    #[test]
    fn feedback_comment_is_optional() {
        let parsed: Result<FeedbackRequest, _> = serde_json::from_str(r#"{"stars":4}"#);
        assert!(parsed.is_ok_and(|r| r.stars == 4 && r.comment.is_none()));
    }
}
