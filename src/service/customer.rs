//! Customer login and ticket feedback.

use chrono::NaiveDate;

use super::QueueService;
use crate::domain::{Customer, Feedback, TicketId};
use crate::error::QueueError;
use crate::persistence::NewFeedback;

impl QueueService {
    /// Finds or creates the customer with this phone and birth date.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidRequest`] for a blank phone number, or
    /// the storage error.
    pub async fn login_customer(
        &self,
        phone: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Customer, QueueError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(QueueError::InvalidRequest("phone is required".to_string()));
        }
        let customer = self
            .store
            .find_or_create_customer(phone, date_of_birth, self.clock.utc_now())
            .await?;
        tracing::debug!(customer_id = %customer.id, points = customer.points, "customer logged in");
        Ok(customer)
    }

    /// Records star feedback for a ticket. The first submission wins; later
    /// ones return the stored feedback unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidStars`] outside `1..=5`,
    /// [`QueueError::TicketNotFound`] for an unknown ticket, or the storage
    /// error.
    pub async fn submit_feedback(
        &self,
        ticket_id: TicketId,
        stars: i32,
        comment: Option<&str>,
    ) -> Result<Feedback, QueueError> {
        if !(1..=5).contains(&stars) {
            return Err(QueueError::InvalidStars(stars));
        }
        let comment = comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(ToString::to_string);

        let feedback = self
            .store
            .insert_feedback(NewFeedback {
                ticket_id,
                stars,
                comment,
                created_at: self.clock.utc_now(),
            })
            .await?;
        tracing::info!(%ticket_id, feedback_id = %feedback.id, stars = feedback.stars, "feedback recorded");
        Ok(feedback)
    }
}
