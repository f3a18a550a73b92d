//! Derivation of room status and personal ticket views from storage.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::domain::shift::current_shift_prefix;
use crate::domain::{MyTicketView, Room, RoomStatus, TicketId, TicketNumber, TicketStatus};
use crate::error::QueueError;
use crate::persistence::QueueStore;

/// Builds the [`RoomStatus`] of `room` on `service_date` as seen at `now`.
///
/// The counter row, the lowest serving ticket, the lowest waiting ticket
/// and the waiting count are independent point-in-time reads; under
/// concurrent writes they may be momentarily skewed against each other.
///
/// `next_to_take` is advisory: it is what the next take would get if no
/// other take happened first.
///
/// # Errors
///
/// Returns the storage error of any failed read.
pub async fn build_room_status(
    store: &dyn QueueStore,
    room: &Room,
    service_date: NaiveDate,
    now: DateTime<Tz>,
) -> Result<RoomStatus, QueueError> {
    let shift = current_shift_prefix(now.time(), &room.reset_times());

    let (counter, current, next, waiting_count) = tokio::try_join!(
        store.counter(room.id, service_date),
        store.lowest_ticket_with_status(room.id, service_date, TicketStatus::Serving),
        store.lowest_ticket_with_status(room.id, service_date, TicketStatus::Waiting),
        store.count_with_status(room.id, service_date, TicketStatus::Waiting),
    )?;

    let next_to_take = match counter {
        Some(counter) if counter.current_shift == shift => {
            TicketNumber::new(&shift, counter.next_number.saturating_add(1))
        }
        _ => TicketNumber::new(&shift, 1),
    };

    Ok(RoomStatus {
        room_id: room.id,
        room_slug: room.slug.clone(),
        room_name: room.name.clone(),
        service_date,
        service_minutes: room.effective_service_minutes(),
        current: current.as_ref().map(TicketNumber::from),
        next: next.as_ref().map(TicketNumber::from),
        next_to_take,
        waiting_count,
        now: now.fixed_offset(),
    })
}

/// Builds the personal view of `ticket_id`, or `None` when the ticket does
/// not belong to `room` on `service_date`.
///
/// # Errors
///
/// Returns the storage error of any failed read.
pub async fn build_my_ticket_view(
    store: &dyn QueueStore,
    room: &Room,
    service_date: NaiveDate,
    ticket_id: TicketId,
    now: DateTime<Tz>,
) -> Result<Option<MyTicketView>, QueueError> {
    let Some(ticket) = store.ticket(ticket_id).await? else {
        return Ok(None);
    };
    if ticket.room_id != room.id || ticket.service_date != service_date {
        return Ok(None);
    }

    let now = now.fixed_offset();
    if ticket.status.is_terminal() {
        return Ok(Some(MyTicketView::terminal(&ticket, now)));
    }

    let ahead = store
        .count_ahead(room.id, service_date, ticket.number)
        .await?;
    Ok(Some(MyTicketView::pending(
        &ticket,
        ahead,
        room.effective_service_minutes(),
        now,
    )))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::{NewTicket, RoomId, SiteId};
    use crate::persistence::InMemoryStore;

    fn room(reset_times: &str) -> Room {
        Room {
            id: RoomId::new(),
            site_id: SiteId::new(),
            slug: "room-1".to_string(),
            name: "Room 1".to_string(),
            service_minutes: 10,
            shift_reset_times: Some(reset_times.to_string()),
        }
    }

    fn bangkok(hour: u32, minute: u32) -> DateTime<Tz> {
        let Some(t) = chrono_tz::Asia::Bangkok
            .with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
            .single()
        else {
            panic!("valid local time");
        };
        t
    }

    async fn take(store: &InMemoryStore, room: &Room, shift: &str, at: DateTime<Tz>) -> TicketId {
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let Ok(number) = tx
            .upsert_counter(room.id, at.date_naive(), shift, at.with_timezone(&Utc))
            .await
        else {
            panic!("allocation failed");
        };
        let Ok(ticket) = tx
            .insert_ticket(NewTicket {
                room_id: room.id,
                service_date: at.date_naive(),
                number,
                shift_prefix: shift.to_string(),
                customer_id: None,
                created_at: at.with_timezone(&Utc),
            })
            .await
        else {
            panic!("insert failed");
        };
        assert!(tx.commit().await.is_ok());
        ticket.id
    }

    #[tokio::test]
    async fn empty_room_offers_number_one() {
        let store = InMemoryStore::new();
        let room = room("08:00,13:00");
        let now = bangkok(9, 0);
        let Ok(status) = build_room_status(&store, &room, now.date_naive(), now).await else {
            panic!("status failed");
        };
        assert_eq!(status.next_to_take.display, "A-001");
        assert_eq!(status.waiting_count, 0);
        assert!(status.current.is_none());
        assert!(status.next.is_none());
    }

    #[tokio::test]
    async fn next_to_take_follows_the_counter_within_a_shift() {
        let store = InMemoryStore::new();
        let room = room("08:00,13:00");
        let morning = bangkok(9, 0);
        take(&store, &room, "A", morning).await;
        take(&store, &room, "A", morning).await;

        let Ok(status) = build_room_status(&store, &room, morning.date_naive(), morning).await
        else {
            panic!("status failed");
        };
        assert_eq!(status.next_to_take.number, 3);
        assert_eq!(status.waiting_count, 2);
        assert_eq!(status.next.map(|n| n.number), Some(1));
    }

    #[tokio::test]
    async fn next_to_take_restarts_after_shift_boundary() {
        let store = InMemoryStore::new();
        let room = room("08:00,13:00");
        let morning = bangkok(9, 0);
        take(&store, &room, "A", morning).await;

        let afternoon = bangkok(14, 0);
        let Ok(status) = build_room_status(&store, &room, afternoon.date_naive(), afternoon).await
        else {
            panic!("status failed");
        };
        assert_eq!(status.next_to_take.display, "B-001");
    }

    #[tokio::test]
    async fn my_ticket_counts_tickets_ahead() {
        let store = InMemoryStore::new();
        let room = room("00:00");
        let now = bangkok(10, 0);
        for _ in 0..3 {
            take(&store, &room, "A", now).await;
        }
        let mine = take(&store, &room, "A", now).await;

        let Ok(Some(view)) = build_my_ticket_view(&store, &room, now.date_naive(), mine, now).await
        else {
            panic!("view missing");
        };
        assert_eq!(view.ahead_count, 3);
        assert_eq!(view.estimated_wait_minutes, 30);
        assert_eq!(
            view.estimated_serve_time,
            now.fixed_offset() + chrono::Duration::minutes(30)
        );
    }

    #[tokio::test]
    async fn my_ticket_is_absent_for_other_room_or_date() {
        let store = InMemoryStore::new();
        let room_a = room("00:00");
        let room_b = room("00:00");
        let now = bangkok(10, 0);
        let mine = take(&store, &room_a, "A", now).await;

        let other_room = build_my_ticket_view(&store, &room_b, now.date_naive(), mine, now).await;
        assert!(matches!(other_room, Ok(None)));

        let tomorrow = now.date_naive().succ_opt().unwrap_or_default();
        let other_day = build_my_ticket_view(&store, &room_a, tomorrow, mine, now).await;
        assert!(matches!(other_day, Ok(None)));

        let unknown = build_my_ticket_view(&store, &room_a, now.date_naive(), TicketId::new(), now)
            .await;
        assert!(matches!(unknown, Ok(None)));
    }
}
