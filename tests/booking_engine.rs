use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use rust_decimal::dec;
use rust_decimal::Decimal;

use courtbook::db::{self, queries};
use courtbook::errors::BookingError;
use courtbook::models::{
    Actor, Booking, BookingOptions, BookingStatus, Court, CourtUpdate, HistoryAction, InvitationStatus,
    NewBooking, NewCourt, NewPlayer, PaymentStatus, Player, RatingLevel, Reschedule,
};
use courtbook::services::booking::CancelPolicy;
use courtbook::services::rules::BookingRules;
use courtbook::services::Engine;

// ── Helpers ──

fn t(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap()
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// A few days before every booking used below.
fn early() -> NaiveDateTime {
    dt("2025-05-30 09:00:00")
}

struct Club {
    conn: Connection,
    engine: Engine,
    court: Court,
    owner: Player,
    actor: Actor,
}

fn register(engine: &Engine, conn: &Connection, name: &str, phone: &str, rating: Option<&str>) -> Player {
    engine
        .register_player(
            conn,
            NewPlayer {
                display_name: name.to_string(),
                phone: phone.to_string(),
                rating: rating.map(RatingLevel::new),
                is_coach: false,
                is_staff: false,
            },
            early(),
        )
        .unwrap()
}

fn add_court(engine: &Engine, conn: &Connection, name: &str, rate: Decimal) -> Court {
    engine
        .create_court(
            conn,
            NewCourt {
                name: name.to_string(),
                description: String::new(),
                price_per_hour: rate,
                is_available: true,
            },
        )
        .unwrap()
}

fn club_with_rate(rate: Decimal) -> Club {
    let conn = db::init_db(":memory:").unwrap();
    let engine = Engine::new(BookingRules::default());
    let court = add_court(&engine, &conn, "Court A", rate);
    let owner = register(&engine, &conn, "Owner", "+7 999 000 00 01", Some("B"));
    let actor = Actor::Player(owner.id.clone());
    Club {
        conn,
        engine,
        court,
        owner,
        actor,
    }
}

fn club() -> Club {
    club_with_rate(dec!(1500))
}

fn request(owner: &Player, court: &Court, date: &str, start: &str, end: &str) -> NewBooking {
    NewBooking {
        owner_id: owner.id.clone(),
        court_id: court.id.clone(),
        date: d(date),
        start_time: t(start),
        end_time: t(end),
        options: BookingOptions::default(),
    }
}

fn open_request(owner: &Player, court: &Court, max_players: u8, rating: Option<&str>) -> NewBooking {
    let mut req = request(owner, court, "2025-06-01", "10:00", "12:00");
    req.options = BookingOptions {
        coach_id: None,
        looking_for_partner: true,
        max_players: Some(max_players),
        required_rating_level: rating.map(RatingLevel::new),
    };
    req
}

impl Club {
    fn book(&mut self, date: &str, start: &str, end: &str) -> Result<Booking, BookingError> {
        let req = request(&self.owner, &self.court, date, start, end);
        self.engine.create_booking(&mut self.conn, &self.actor, req, early())
    }

    fn history(&self, booking_id: &str) -> Vec<HistoryAction> {
        self.engine
            .booking_history(&self.conn, booking_id)
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect()
    }
}

fn assert_no_overlap(conn: &Connection, court_id: &str, date: NaiveDate) {
    let active = queries::active_bookings_on(conn, court_id, date).unwrap();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            assert!(
                !a.overlaps(b.start_time, b.end_time),
                "overlap between {} ({}-{}) and {} ({}-{})",
                a.id,
                a.start_time,
                a.end_time,
                b.id,
                b.start_time,
                b.end_time
            );
        }
    }
}

// ── Scenarios ──

#[test]
fn test_court_a_conflict_cancel_rebook() {
    let mut club = club();

    let first = club.book("2025-06-01", "10:00", "12:00").unwrap();
    let view = club.engine.view(&club.conn, first.clone()).unwrap();
    assert_eq!(view.price.total_price, dec!(3000.00));
    assert_eq!(view.price.total_price.to_string(), "3000.00");

    match club.book("2025-06-01", "11:00", "13:00") {
        Err(BookingError::SlotTaken(existing)) => assert_eq!(existing.id, first.id),
        other => panic!("expected SLOT_TAKEN, got {other:?}"),
    }

    let two_hours_before = dt("2025-06-01 08:00:00");
    let cancelled = club
        .engine
        .cancel_booking(
            &mut club.conn,
            &club.actor,
            &first.id,
            two_hours_before,
            CancelPolicy::Enforce,
            None,
        )
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let again = club.book("2025-06-01", "11:00", "13:00").unwrap();
    assert_eq!(again.status, BookingStatus::Pending);
    assert_no_overlap(&club.conn, &club.court.id, d("2025-06-01"));
}

#[test]
fn test_rating_gated_join() {
    let mut club = club();
    let booking = club
        .engine
        .create_booking(
            &mut club.conn,
            &club.actor,
            open_request(&club.owner, &club.court, 2, Some("B")),
            early(),
        )
        .unwrap();

    let c_player = register(&club.engine, &club.conn, "C", "89990000002", Some("C"));
    let b_player = register(&club.engine, &club.conn, "B", "89990000003", Some("B"));

    let err = club
        .engine
        .join_booking(&mut club.conn, &Actor::Player(c_player.id.clone()), &booking.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "RATING_MISMATCH");

    let joined = club
        .engine
        .join_booking(&mut club.conn, &Actor::Player(b_player.id.clone()), &booking.id, early())
        .unwrap();
    assert_eq!(joined.available_slots(), 0);
    assert!(joined.is_full());

    let stored = club.engine.get_booking(&club.conn, &booking.id).unwrap();
    assert_eq!(stored.partners, vec![b_player.id]);
}

#[test]
fn test_unrated_player_blocked_by_rating_gate() {
    let mut club = club();
    let booking = club
        .engine
        .create_booking(
            &mut club.conn,
            &club.actor,
            open_request(&club.owner, &club.court, 4, Some("B")),
            early(),
        )
        .unwrap();
    let unrated = register(&club.engine, &club.conn, "New", "9990000004", None);

    let err = club
        .engine
        .join_booking(&mut club.conn, &Actor::Player(unrated.id), &booking.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "NO_RATING");
}

// ── Partner matching ──

#[test]
fn test_second_join_is_already_in() {
    let mut club = club();
    let booking = club
        .engine
        .create_booking(
            &mut club.conn,
            &club.actor,
            open_request(&club.owner, &club.court, 4, None),
            early(),
        )
        .unwrap();
    let p = register(&club.engine, &club.conn, "P", "89990000010", None);
    let actor = Actor::Player(p.id.clone());

    club.engine.join_booking(&mut club.conn, &actor, &booking.id, early()).unwrap();
    let err = club
        .engine
        .join_booking(&mut club.conn, &actor, &booking.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_IN");

    let stored = club.engine.get_booking(&club.conn, &booking.id).unwrap();
    assert_eq!(stored.partners.len(), 1);

    let joins = club
        .history(&booking.id)
        .into_iter()
        .filter(|a| *a == HistoryAction::PartnerJoined)
        .count();
    assert_eq!(joins, 1);
}

#[test]
fn test_capacity_of_four() {
    let mut club = club();
    let booking = club
        .engine
        .create_booking(
            &mut club.conn,
            &club.actor,
            open_request(&club.owner, &club.court, 4, None),
            early(),
        )
        .unwrap();

    for i in 0..3 {
        let p = register(&club.engine, &club.conn, "P", &format!("8999000002{i}"), None);
        club.engine
            .join_booking(&mut club.conn, &Actor::Player(p.id), &booking.id, early())
            .unwrap();
    }

    let fourth = register(&club.engine, &club.conn, "Late", "89990000029", None);
    let err = club
        .engine
        .join_booking(&mut club.conn, &Actor::Player(fourth.id), &booking.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "FULL");
    assert_eq!(club.engine.get_booking(&club.conn, &booking.id).unwrap().participant_count(), 4);
}

#[test]
fn test_join_checks_on_closed_bookings() {
    let mut club = club();
    let closed = club.book("2025-06-01", "10:00", "12:00").unwrap();
    let p = register(&club.engine, &club.conn, "P", "89990000030", None);

    let err = club
        .engine
        .join_booking(&mut club.conn, &Actor::Player(p.id.clone()), &closed.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "NOT_LOOKING");

    let mut req = open_request(&club.owner, &club.court, 4, None);
    req.start_time = t("14:00");
    req.end_time = t("15:00");
    let open = club
        .engine
        .create_booking(&mut club.conn, &club.actor, req, early())
        .unwrap();
    club.engine
        .cancel_booking(&mut club.conn, &club.actor, &open.id, early(), CancelPolicy::Enforce, None)
        .unwrap();
    let err = club
        .engine
        .join_booking(&mut club.conn, &Actor::Player(p.id), &open.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "CANCELLED");
}

#[test]
fn test_open_bookings_listing() {
    let mut club = club();
    let open = club
        .engine
        .create_booking(
            &mut club.conn,
            &club.actor,
            open_request(&club.owner, &club.court, 2, None),
            early(),
        )
        .unwrap();
    club.book("2025-06-01", "14:00", "15:00").unwrap();

    let listed = club.engine.open_bookings(&club.conn, early()).unwrap();
    assert_eq!(listed.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), vec![open.id.as_str()]);

    let p = register(&club.engine, &club.conn, "P", "89990000031", None);
    club.engine
        .join_booking(&mut club.conn, &Actor::Player(p.id.clone()), &open.id, early())
        .unwrap();
    assert!(club.engine.open_bookings(&club.conn, early()).unwrap().is_empty());

    let mine = club.engine.bookings_for_player(&club.conn, &p.id).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(club.engine.bookings_for_player(&club.conn, &club.owner.id).unwrap().len(), 2);
}

// ── Confirmation window ──

fn pending_at(club: &mut Club, start: &str, end: &str) -> Booking {
    club.book("2025-06-02", start, end).unwrap()
}

#[test]
fn test_confirmation_window_boundaries() {
    let mut club = club();
    let start = dt("2025-06-02 10:00:00");
    let owner = club.actor.clone();

    let b = pending_at(&mut club, "10:00", "11:00");
    let err = club
        .engine
        .confirm_booking(&mut club.conn, &owner, &b.id, start - Duration::hours(24) - Duration::seconds(1))
        .unwrap_err();
    assert_eq!(err.code(), "OUTSIDE_WINDOW");

    let confirmed = club
        .engine
        .confirm_booking(&mut club.conn, &owner, &b.id, start - Duration::hours(24))
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.confirmed_at, Some(start - Duration::hours(24)));

    let stored = club.engine.get_booking(&club.conn, &b.id).unwrap();
    assert_eq!(stored.confirmed_at, Some(start - Duration::hours(24)));

    let err = club
        .engine
        .confirm_booking(&mut club.conn, &owner, &b.id, start - Duration::hours(1))
        .unwrap_err();
    assert_eq!(err.code(), "WRONG_STATE");

    let late = pending_at(&mut club, "12:00", "13:00");
    let late_start = dt("2025-06-02 12:00:00");
    club.engine
        .confirm_booking(&mut club.conn, &owner, &late.id, late_start - Duration::seconds(1))
        .unwrap();

    let missed = pending_at(&mut club, "14:00", "15:00");
    let err = club
        .engine
        .confirm_booking(&mut club.conn, &owner, &missed.id, dt("2025-06-02 14:00:00"))
        .unwrap_err();
    assert_eq!(err.code(), "OUTSIDE_WINDOW");
    let err = club
        .engine
        .confirm_booking(&mut club.conn, &owner, &missed.id, dt("2025-06-02 14:30:00"))
        .unwrap_err();
    assert_eq!(err.code(), "OUTSIDE_WINDOW");
}

#[test]
fn test_outside_window_reports_hours_until() {
    let mut club = club();
    let b = pending_at(&mut club, "10:00", "11:00");

    let now = dt("2025-05-31 06:30:00");
    assert_eq!(club.engine.hours_until_confirmable(&b, now), 3);
    match club.engine.confirm_booking(&mut club.conn, &club.actor, &b.id, now) {
        Err(BookingError::OutsideWindow { window_hours, hours_until }) => {
            assert_eq!(window_hours, 24);
            assert_eq!(hours_until, 3);
        }
        other => panic!("expected OUTSIDE_WINDOW, got {other:?}"),
    }
}

#[test]
fn test_only_owner_or_staff_confirms() {
    let mut club = club();
    let b = pending_at(&mut club, "10:00", "11:00");
    let stranger = register(&club.engine, &club.conn, "X", "89990000040", None);
    let now = dt("2025-06-02 08:00:00");

    let err = club
        .engine
        .confirm_booking(&mut club.conn, &Actor::Player(stranger.id), &b.id, now)
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    club.engine
        .confirm_booking(&mut club.conn, &Actor::Staff("s1".to_string()), &b.id, now)
        .unwrap();
}

// ── Cancellation ──

#[test]
fn test_cancellation_cutoff_boundaries() {
    let mut club = club();
    let owner = club.actor.clone();
    let start = dt("2025-06-02 10:00:00");

    let ok = pending_at(&mut club, "10:00", "11:00");
    club.engine
        .cancel_booking(
            &mut club.conn,
            &owner,
            &ok.id,
            start - Duration::hours(1) - Duration::seconds(1),
            CancelPolicy::Enforce,
            None,
        )
        .unwrap();

    let late = pending_at(&mut club, "12:00", "13:00");
    let err = club
        .engine
        .cancel_booking(
            &mut club.conn,
            &owner,
            &late.id,
            dt("2025-06-02 11:00:00"),
            CancelPolicy::Enforce,
            None,
        )
        .unwrap_err();
    assert_eq!(err.code(), "TOO_LATE");

    // Players cannot override the cutoff, staff can.
    let err = club
        .engine
        .cancel_booking(
            &mut club.conn,
            &owner,
            &late.id,
            dt("2025-06-02 11:00:00"),
            CancelPolicy::SkipCutoff,
            None,
        )
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let cancelled = club
        .engine
        .cancel_booking(
            &mut club.conn,
            &Actor::Staff("s1".to_string()),
            &late.id,
            dt("2025-06-02 11:30:00"),
            CancelPolicy::SkipCutoff,
            Some("court maintenance"),
        )
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let err = club
        .engine
        .cancel_booking(
            &mut club.conn,
            &Actor::Staff("s1".to_string()),
            &late.id,
            dt("2025-06-02 11:30:00"),
            CancelPolicy::SkipCutoff,
            None,
        )
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_CANCELLED");

    let entries = club.engine.booking_history(&club.conn, &late.id).unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.action, HistoryAction::Cancelled);
    assert_eq!(last.actor.as_deref(), Some("staff:s1"));
    assert_eq!(last.comment.as_deref(), Some("court maintenance"));
}

#[test]
fn test_cannot_cancel_past_booking_even_with_override() {
    let mut club = club();
    let b = pending_at(&mut club, "10:00", "11:00");

    let err = club
        .engine
        .cancel_booking(
            &mut club.conn,
            &Actor::System,
            &b.id,
            dt("2025-06-03 09:00:00"),
            CancelPolicy::SkipCutoff,
            None,
        )
        .unwrap_err();
    assert_eq!(err.code(), "PAST");
}

// ── Validation entry points ──

#[test]
fn test_create_validation_errors() {
    let mut club = club();
    assert_eq!(club.book("2025-05-29", "10:00", "12:00").unwrap_err().code(), "PAST_DATE");
    assert_eq!(club.book("2025-05-30", "08:00", "10:00").unwrap_err().code(), "PAST_DATE");
    assert_eq!(club.book("2025-06-01", "12:00", "10:00").unwrap_err().code(), "BAD_ORDER");
    assert_eq!(club.book("2025-06-01", "23:00", "01:00").unwrap_err().code(), "BAD_ORDER");
    assert_eq!(club.book("2025-06-01", "10:00", "10:30").unwrap_err().code(), "BAD_DURATION");
    assert_eq!(club.book("2025-06-01", "10:00", "14:00").unwrap_err().code(), "BAD_DURATION");
    assert_eq!(club.book("2025-06-01", "07:00", "09:00").unwrap_err().code(), "OUTSIDE_HOURS");
    assert_eq!(club.book("2025-06-01", "21:00", "23:00").unwrap_err().code(), "OUTSIDE_HOURS");

    assert!(club.book("2025-06-01", "08:00", "09:00").is_ok());
    assert!(club.book("2025-06-01", "19:00", "22:00").is_ok());
}

#[test]
fn test_create_authorization_and_references() {
    let mut club = club();
    let other = register(&club.engine, &club.conn, "Other", "89990000050", None);

    let req = request(&other, &club.court, "2025-06-01", "10:00", "11:00");
    let err = club
        .engine
        .create_booking(&mut club.conn, &club.actor, req.clone(), early())
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    // Staff quick-create for any registered player.
    let booked = club
        .engine
        .create_booking(&mut club.conn, &Actor::Staff("s1".to_string()), req, early())
        .unwrap();
    assert_eq!(booked.owner_id, other.id);

    let mut req = request(&club.owner, &club.court, "2025-06-01", "12:00", "13:00");
    req.court_id = "missing".to_string();
    let err = club
        .engine
        .create_booking(&mut club.conn, &club.actor, req, early())
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let mut req = request(&club.owner, &club.court, "2025-06-01", "12:00", "13:00");
    req.options.coach_id = Some(other.id.clone());
    let err = club
        .engine
        .create_booking(&mut club.conn, &club.actor, req, early())
        .unwrap_err();
    assert_eq!(err.code(), "NOT_A_COACH");

    let mut req = request(&club.owner, &club.court, "2025-06-01", "12:00", "13:00");
    req.options.max_players = Some(5);
    let err = club
        .engine
        .create_booking(&mut club.conn, &club.actor, req, early())
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_MAX_PLAYERS");
}

#[test]
fn test_coach_booking() {
    let mut club = club();
    let coach = club
        .engine
        .register_player(
            &club.conn,
            NewPlayer {
                display_name: "Coach".to_string(),
                phone: "89990000060".to_string(),
                rating: Some(RatingLevel::new("A")),
                is_coach: true,
                is_staff: false,
            },
            early(),
        )
        .unwrap();

    let mut req = request(&club.owner, &club.court, "2025-06-01", "10:00", "11:00");
    req.options.coach_id = Some(coach.id.clone());
    let booking = club
        .engine
        .create_booking(&mut club.conn, &club.actor, req, early())
        .unwrap();
    assert_eq!(booking.coach_id, Some(coach.id));
}

#[test]
fn test_unavailable_court_rejects_bookings() {
    let mut club = club();
    club.engine
        .update_court(
            &club.conn,
            &club.court.id,
            courtbook::models::CourtUpdate {
                is_available: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(club.book("2025-06-01", "10:00", "11:00").unwrap_err().code(), "COURT_UNAVAILABLE");
}

// ── Pricing ──

#[test]
fn test_price_split_with_partner() {
    let mut club = club_with_rate(dec!(1000));
    let booking = club
        .engine
        .create_booking(
            &mut club.conn,
            &club.actor,
            open_request(&club.owner, &club.court, 4, None),
            early(),
        )
        .unwrap();

    let view = club.engine.view(&club.conn, booking.clone()).unwrap();
    assert_eq!(view.price.total_price, dec!(2000.00));
    assert_eq!(view.price.price_per_person, dec!(2000.00));

    let p = register(&club.engine, &club.conn, "P", "89990000070", None);
    let joined = club
        .engine
        .join_booking(&mut club.conn, &Actor::Player(p.id), &booking.id, early())
        .unwrap();
    let view = club.engine.view(&club.conn, joined).unwrap();
    assert_eq!(view.price.total_price, dec!(2000.00));
    assert_eq!(view.price.price_per_person, dec!(1000.00));
}

// ── Invitations ──

#[test]
fn test_invitation_flow() {
    let mut club = club();
    let owner = club.actor.clone();
    let booking = club
        .engine
        .create_booking(&mut club.conn, &owner, open_request(&club.owner, &club.court, 4, None), early())
        .unwrap();
    let friend = register(&club.engine, &club.conn, "Friend", "+7 (999) 000-00-80", None);

    let inv = club
        .engine
        .send_invitation(&mut club.conn, &owner, &booking.id, "8 999 000 00 80", Some("come play".into()), early())
        .unwrap();
    assert_eq!(inv.invitee_phone, "+79990000080");
    assert_eq!(inv.invitee_id.as_deref(), Some(friend.id.as_str()));
    assert_eq!(inv.status, InvitationStatus::Pending);

    let err = club
        .engine
        .send_invitation(&mut club.conn, &owner, &booking.id, "9990000080", None, early())
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE");

    let pending = club.engine.pending_invitations_for(&club.conn, &friend.id).unwrap();
    assert_eq!(pending.len(), 1);

    let err = club
        .engine
        .respond_invitation(&mut club.conn, &owner, &inv.id, true, early())
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let accepted = club
        .engine
        .respond_invitation(&mut club.conn, &Actor::Player(friend.id.clone()), &inv.id, true, early())
        .unwrap();
    assert_eq!(accepted.status, InvitationStatus::Accepted);
    assert!(accepted.responded_at.is_some());

    let stored = club.engine.get_booking(&club.conn, &booking.id).unwrap();
    assert_eq!(stored.partners, vec![friend.id.clone()]);

    let err = club
        .engine
        .respond_invitation(&mut club.conn, &Actor::Player(friend.id.clone()), &inv.id, false, early())
        .unwrap_err();
    assert_eq!(err.code(), "INVITATION_RESOLVED");

    assert_eq!(
        club.history(&booking.id),
        vec![
            HistoryAction::Created,
            HistoryAction::InvitationSent,
            HistoryAction::PartnerJoined,
            HistoryAction::InvitationAccepted,
        ]
    );
}

#[test]
fn test_invitation_rejections() {
    let mut club = club();
    let owner = club.actor.clone();
    let booking = club
        .engine
        .create_booking(&mut club.conn, &owner, open_request(&club.owner, &club.court, 4, None), early())
        .unwrap();
    let partner = register(&club.engine, &club.conn, "Partner", "89990000090", None);
    club.engine
        .join_booking(&mut club.conn, &Actor::Player(partner.id.clone()), &booking.id, early())
        .unwrap();

    let cases = [
        ("+7 999 000 00 01", "SELF"),
        ("89990000090", "ALREADY_MEMBER"),
        ("12345", "INVALID_PHONE"),
        ("89990000099", "INVITEE_NOT_FOUND"),
    ];
    for (phone, code) in cases {
        let err = club
            .engine
            .send_invitation(&mut club.conn, &owner, &booking.id, phone, None, early())
            .unwrap_err();
        assert_eq!(err.code(), code, "{phone}");
    }

    let err = club
        .engine
        .send_invitation(&mut club.conn, &Actor::Player(partner.id), &booking.id, "89990000091", None, early())
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}

#[test]
fn test_failed_accept_leaves_invitation_pending() {
    let mut club = club();
    let owner = club.actor.clone();
    let booking = club
        .engine
        .create_booking(&mut club.conn, &owner, open_request(&club.owner, &club.court, 2, None), early())
        .unwrap();
    let invited = register(&club.engine, &club.conn, "Invited", "89990000100", None);
    let walk_in = register(&club.engine, &club.conn, "Walk-in", "89990000101", None);

    let inv = club
        .engine
        .send_invitation(&mut club.conn, &owner, &booking.id, "89990000100", None, early())
        .unwrap();
    club.engine
        .join_booking(&mut club.conn, &Actor::Player(walk_in.id), &booking.id, early())
        .unwrap();

    let err = club
        .engine
        .respond_invitation(&mut club.conn, &Actor::Player(invited.id.clone()), &inv.id, true, early())
        .unwrap_err();
    assert_eq!(err.code(), "FULL");

    let pending = club.engine.pending_invitations_for(&club.conn, &invited.id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, InvitationStatus::Pending);

    let declined = club
        .engine
        .respond_invitation(&mut club.conn, &Actor::Player(invited.id.clone()), &inv.id, false, early())
        .unwrap();
    assert_eq!(declined.status, InvitationStatus::Declined);
    assert!(club.engine.pending_invitations_for(&club.conn, &invited.id).unwrap().is_empty());
}

#[test]
fn test_cancel_invitation() {
    let mut club = club();
    let owner = club.actor.clone();
    let booking = club
        .engine
        .create_booking(&mut club.conn, &owner, open_request(&club.owner, &club.court, 4, None), early())
        .unwrap();
    let friend = register(&club.engine, &club.conn, "Friend", "89990000110", None);
    let inv = club
        .engine
        .send_invitation(&mut club.conn, &owner, &booking.id, "89990000110", None, early())
        .unwrap();

    let err = club
        .engine
        .cancel_invitation(&mut club.conn, &Actor::Player(friend.id.clone()), &inv.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let cancelled = club.engine.cancel_invitation(&mut club.conn, &owner, &inv.id, early()).unwrap();
    assert_eq!(cancelled.status, InvitationStatus::Cancelled);

    let err = club.engine.cancel_invitation(&mut club.conn, &owner, &inv.id, early()).unwrap_err();
    assert_eq!(err.code(), "INVITATION_RESOLVED");

    // A cancelled invitation still blocks a second one to the same number.
    let err = club
        .engine
        .send_invitation(&mut club.conn, &owner, &booking.id, "89990000110", None, early())
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE");
}

// ── Staff operations ──

#[test]
fn test_reschedule() {
    let mut club = club();
    let court_b = add_court(&club.engine, &club.conn, "Court B", dec!(1200));
    let first = club.book("2025-06-01", "10:00", "12:00").unwrap();
    let second = club.book("2025-06-01", "14:00", "16:00").unwrap();
    let staff = Actor::Staff("s1".to_string());

    let target = |court: Option<&str>, start: &str, end: &str| Reschedule {
        court_id: court.map(str::to_string),
        date: d("2025-06-01"),
        start_time: t(start),
        end_time: t(end),
    };

    let err = club
        .engine
        .reschedule_booking(&mut club.conn, &club.actor, &second.id, target(None, "12:00", "14:00"), early())
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let err = club
        .engine
        .reschedule_booking(&mut club.conn, &staff, &second.id, target(None, "11:00", "13:00"), early())
        .unwrap_err();
    assert_eq!(err.code(), "SLOT_TAKEN");

    // Overlapping its own old range is fine.
    let moved = club
        .engine
        .reschedule_booking(&mut club.conn, &staff, &second.id, target(None, "13:00", "15:00"), early())
        .unwrap();
    assert_eq!(moved.start_time, t("13:00"));

    let moved = club
        .engine
        .reschedule_booking(&mut club.conn, &staff, &first.id, target(Some(court_b.id.as_str()), "10:00", "12:00"), early())
        .unwrap();
    assert_eq!(moved.court_id, court_b.id);

    let entries = club.engine.booking_history(&club.conn, &first.id).unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.action, HistoryAction::Rescheduled);
    assert_eq!(last.changes["from"]["court_id"], club.court.id.as_str());
    assert_eq!(last.changes["to"]["court_id"], court_b.id.as_str());

    assert_no_overlap(&club.conn, &club.court.id, d("2025-06-01"));
    assert_no_overlap(&club.conn, &court_b.id, d("2025-06-01"));
}

#[test]
fn test_delete_booking_keeps_history() {
    let mut club = club();
    let booking = club.book("2025-06-01", "10:00", "12:00").unwrap();

    let err = club
        .engine
        .delete_booking(&mut club.conn, &club.actor, &booking.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    club.engine
        .delete_booking(&mut club.conn, &Actor::Staff("s1".to_string()), &booking.id, early())
        .unwrap();

    let err = club.engine.get_booking(&club.conn, &booking.id).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(club.history(&booking.id), vec![HistoryAction::Created, HistoryAction::Deleted]);

    // The slot is free again.
    club.book("2025-06-01", "10:00", "12:00").unwrap();
}

#[test]
fn test_court_delete_guard() {
    let mut club = club();
    let booking = club.book("2025-06-01", "10:00", "12:00").unwrap();

    let err = club
        .engine
        .delete_court(&mut club.conn, &club.court.id, early())
        .unwrap_err();
    assert!(matches!(err, BookingError::CourtInUse { active: 1 }));

    // Once the only booking is in the past the court can go, taking the booking with it.
    club.engine
        .delete_court(&mut club.conn, &club.court.id, dt("2025-06-02 09:00:00"))
        .unwrap();
    assert_eq!(club.engine.get_booking(&club.conn, &booking.id).unwrap_err().code(), "NOT_FOUND");
    assert_eq!(club.history(&booking.id), vec![HistoryAction::Created]);
}

#[test]
fn test_payment_stub() {
    let mut club = club();
    let booking = club.book("2025-06-01", "10:00", "12:00").unwrap();
    let owner = club.actor.clone();
    let staff = Actor::Staff("s1".to_string());

    let payment = club
        .engine
        .create_payment(&mut club.conn, &owner, &booking.id, "card", early())
        .unwrap();
    assert_eq!(payment.amount, dec!(3000.00));
    assert_eq!(payment.status, PaymentStatus::Pending);

    let err = club
        .engine
        .create_payment(&mut club.conn, &owner, &booking.id, "card", early())
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT_EXISTS");

    let err = club
        .engine
        .refund_payment(&mut club.conn, &staff, &payment.id, early())
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT_STATE");

    let paid = club
        .engine
        .mark_paid(&mut club.conn, &staff, &payment.id, Some("txn-42"), early())
        .unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert_eq!(paid.transaction_id.as_deref(), Some("txn-42"));
    assert_eq!(paid.paid_at, Some(early()));

    let refunded = club
        .engine
        .refund_payment(&mut club.conn, &staff, &payment.id, early())
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);

    let stored = club.engine.payment_for_booking(&club.conn, &booking.id).unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);
    assert_eq!(stored.transaction_id.as_deref(), Some("txn-42"));

    assert_eq!(
        club.history(&booking.id),
        vec![
            HistoryAction::Created,
            HistoryAction::PaymentPending,
            HistoryAction::PaymentPaid,
            HistoryAction::PaymentRefunded,
        ]
    );
}

#[test]
fn test_register_player_rejects_duplicate_phone() {
    let club = club();
    let err = club
        .engine
        .register_player(
            &club.conn,
            NewPlayer {
                display_name: "Twin".to_string(),
                phone: "89990000001".to_string(),
                rating: None,
                is_coach: false,
                is_staff: false,
            },
            early(),
        )
        .unwrap_err();
    assert_eq!(err.code(), "PHONE_TAKEN");

    let updated = club
        .engine
        .set_rating(&club.conn, &club.owner.id, Some(RatingLevel::new("A")))
        .unwrap();
    assert_eq!(updated.rating, Some(RatingLevel::new("A")));
}

// ── Slot cache ──

#[test]
fn test_mutations_invalidate_slot_cache() {
    let mut club = club();
    let court_b = add_court(&club.engine, &club.conn, "Court B", dec!(900));
    let staff = Actor::Staff("s1".to_string());
    let (day1, day2) = (d("2025-06-01"), d("2025-06-02"));

    // Index 0 is 08:00, so a 10:00-12:00 booking covers slots 2 and 3.
    let taken = |club: &Club, court: &str, date: NaiveDate| -> Vec<usize> {
        club.engine
            .list_available_slots(&club.conn, court, date, early())
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.available)
            .map(|(i, _)| i)
            .collect()
    };

    assert!(taken(&club, &club.court.id, day1).is_empty());
    let booking = club.book("2025-06-01", "10:00", "12:00").unwrap();
    assert_eq!(taken(&club, &club.court.id, day1), vec![2, 3]);

    club.engine
        .cancel_booking(&mut club.conn, &club.actor, &booking.id, early(), CancelPolicy::Enforce, None)
        .unwrap();
    assert!(taken(&club, &club.court.id, day1).is_empty());

    // Reschedule to another court drops both keys.
    let booking = club.book("2025-06-01", "10:00", "12:00").unwrap();
    assert_eq!(taken(&club, &club.court.id, day1), vec![2, 3]);
    assert!(taken(&club, &court_b.id, day1).is_empty());
    let target = Reschedule {
        court_id: Some(court_b.id.clone()),
        date: day1,
        start_time: t("14:00"),
        end_time: t("15:00"),
    };
    club.engine
        .reschedule_booking(&mut club.conn, &staff, &booking.id, target, early())
        .unwrap();
    assert!(taken(&club, &club.court.id, day1).is_empty());
    assert_eq!(taken(&club, &court_b.id, day1), vec![6]);

    // Reschedule to another date on the same court.
    assert!(taken(&club, &court_b.id, day2).is_empty());
    let target = Reschedule {
        court_id: None,
        date: day2,
        start_time: t("08:00"),
        end_time: t("10:00"),
    };
    club.engine
        .reschedule_booking(&mut club.conn, &staff, &booking.id, target, early())
        .unwrap();
    assert!(taken(&club, &court_b.id, day1).is_empty());
    assert_eq!(taken(&club, &court_b.id, day2), vec![0, 1]);

    club.engine
        .delete_booking(&mut club.conn, &staff, &booking.id, early())
        .unwrap();
    assert!(taken(&club, &court_b.id, day2).is_empty());

    // Toggling availability drops every cached date of the court.
    assert!(club.engine.cache.contains(&court_b.id, day1));
    assert!(club.engine.cache.contains(&court_b.id, day2));
    let closed = CourtUpdate {
        is_available: Some(false),
        ..Default::default()
    };
    club.engine.update_court(&club.conn, &court_b.id, closed).unwrap();
    assert!(!club.engine.cache.contains(&court_b.id, day1));
    assert!(!club.engine.cache.contains(&court_b.id, day2));
    assert_eq!(taken(&club, &court_b.id, day2).len(), 14);

    let reopened = CourtUpdate {
        is_available: Some(true),
        ..Default::default()
    };
    club.engine.update_court(&club.conn, &court_b.id, reopened).unwrap();
    assert!(taken(&club, &court_b.id, day2).is_empty());
}

#[test]
fn test_failed_create_leaves_nothing_behind() {
    let mut club = club();
    club.book("2025-06-01", "10:00", "12:00").unwrap();
    let before: i64 = club
        .conn
        .query_row("SELECT COUNT(*) FROM booking_history", [], |row| row.get(0))
        .unwrap();

    assert!(club.book("2025-06-01", "11:00", "12:00").is_err());

    let after: i64 = club
        .conn
        .query_row("SELECT COUNT(*) FROM booking_history", [], |row| row.get(0))
        .unwrap();
    assert_eq!(before, after);
    assert_eq!(club.engine.list_bookings(&club.conn, None, 100).unwrap().len(), 1);
}

// ── Properties ──

#[test]
fn test_random_create_cancel_sequences_never_overlap() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut club = club();
    let court_b = add_court(&club.engine, &club.conn, "Court B", dec!(900));
    let courts = [club.court.clone(), court_b];
    let dates = ["2025-06-01", "2025-06-02"];
    let owner = club.actor.clone();

    // (id, court index, date index, start hour, end hour)
    let mut active: Vec<(String, usize, usize, u32, u32)> = vec![];

    for _ in 0..300 {
        if !active.is_empty() && rng.gen_bool(0.3) {
            let (id, ..) = active.swap_remove(rng.gen_range(0..active.len()));
            club.engine
                .cancel_booking(&mut club.conn, &owner, &id, early(), CancelPolicy::Enforce, None)
                .unwrap();
            continue;
        }

        let c = rng.gen_range(0..courts.len());
        let di = rng.gen_range(0..dates.len());
        let start = rng.gen_range(8..21u32);
        let end = (start + rng.gen_range(1..=3u32)).min(22);

        let clashes = active
            .iter()
            .any(|(_, ac, ad, s, e)| *ac == c && *ad == di && *s < end && start < *e);

        let req = NewBooking {
            owner_id: club.owner.id.clone(),
            court_id: courts[c].id.clone(),
            date: d(dates[di]),
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
            options: BookingOptions::default(),
        };
        match club.engine.create_booking(&mut club.conn, &owner, req, early()) {
            Ok(b) => {
                assert!(!clashes, "created {start}-{end} over an active booking");
                active.push((b.id, c, di, start, end));
            }
            Err(e) => {
                assert!(clashes, "unexpected rejection {start}-{end}: {e}");
                assert_eq!(e.code(), "SLOT_TAKEN");
            }
        }

        for court in &courts {
            for date in dates {
                assert_no_overlap(&club.conn, &court.id, d(date));
            }
        }
    }
}

struct TempDb(std::path::PathBuf);

impl TempDb {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("courtbook-test-{}.db", uuid::Uuid::new_v4())))
    }

    fn path(&self) -> &str {
        self.0.to_str().unwrap()
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path()));
        }
    }
}

#[test]
fn test_concurrent_creates_across_connections() {
    let tmp = TempDb::new();
    let engine = Arc::new(Engine::new(BookingRules::default()));

    let (court, players) = {
        let conn = db::init_db(tmp.path()).unwrap();
        let court = add_court(&engine, &conn, "Court A", dec!(1500));
        let players: Vec<Player> = (0..8)
            .map(|i| register(&engine, &conn, "P", &format!("8999000020{i}"), None))
            .collect();
        (court, players)
    };

    let barrier = Arc::new(Barrier::new(players.len()));
    let handles: Vec<_> = players
        .into_iter()
        .map(|player| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let court = court.clone();
            let path = tmp.path().to_string();
            thread::spawn(move || {
                let mut conn = db::init_db(&path).unwrap();
                let actor = Actor::Player(player.id.clone());
                let req = request(&player, &court, "2025-06-01", "10:00", "12:00");
                barrier.wait();
                engine.create_booking(&mut conn, &actor, req, early())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let won = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(won, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.code(), "SLOT_TAKEN");
    }

    let conn = db::init_db(tmp.path()).unwrap();
    assert_eq!(queries::active_bookings_on(&conn, &court.id, d("2025-06-01")).unwrap().len(), 1);

    let slots = engine
        .list_available_slots(&conn, &court.id, d("2025-06-01"), early())
        .unwrap();
    assert!(!slots[2].available && !slots[3].available);
}

#[test]
fn test_concurrent_creates_on_distinct_slots_all_succeed() {
    let tmp = TempDb::new();
    let engine = Arc::new(Engine::new(BookingRules::default()));

    let (court, players) = {
        let conn = db::init_db(tmp.path()).unwrap();
        let court = add_court(&engine, &conn, "Court A", dec!(1500));
        let players: Vec<Player> = (0..6)
            .map(|i| register(&engine, &conn, "P", &format!("8999000030{i}"), None))
            .collect();
        (court, players)
    };

    let barrier = Arc::new(Barrier::new(players.len()));
    let handles: Vec<_> = players
        .into_iter()
        .enumerate()
        .map(|(i, player)| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let court = court.clone();
            let path = tmp.path().to_string();
            thread::spawn(move || {
                let mut conn = db::init_db(&path).unwrap();
                let start = 8 + 2 * i as u32;
                let mut req = request(&player, &court, "2025-06-01", "08:00", "09:00");
                req.start_time = NaiveTime::from_hms_opt(start, 0, 0).unwrap();
                req.end_time = NaiveTime::from_hms_opt(start + 2, 0, 0).unwrap();
                barrier.wait();
                engine.create_booking(&mut conn, &Actor::Player(player.id.clone()), req, early())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let conn = db::init_db(tmp.path()).unwrap();
    assert_eq!(queries::active_bookings_on(&conn, &court.id, d("2025-06-01")).unwrap().len(), 6);
    assert_no_overlap(&conn, &court.id, d("2025-06-01"));
}

#[test]
fn test_random_concurrent_sequences_never_overlap() {
    let tmp = TempDb::new();
    let engine = Arc::new(Engine::new(BookingRules::default()));

    let (court, players) = {
        let conn = db::init_db(tmp.path()).unwrap();
        let court = add_court(&engine, &conn, "Court A", dec!(1500));
        let players: Vec<Player> = (0..4)
            .map(|i| register(&engine, &conn, "P", &format!("8999000040{i}"), None))
            .collect();
        (court, players)
    };
    let date = d("2025-06-01");

    let handles: Vec<_> = players
        .into_iter()
        .enumerate()
        .map(|(i, player)| {
            let engine = Arc::clone(&engine);
            let court = court.clone();
            let path = tmp.path().to_string();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(i as u64);
                let mut conn = db::init_db(&path).unwrap();
                let actor = Actor::Player(player.id.clone());
                let mut mine: Vec<String> = vec![];

                for _ in 0..40 {
                    if !mine.is_empty() && rng.gen_bool(0.4) {
                        let id = mine.swap_remove(rng.gen_range(0..mine.len()));
                        engine
                            .cancel_booking(&mut conn, &actor, &id, early(), CancelPolicy::Enforce, None)
                            .unwrap();
                    } else {
                        let start = rng.gen_range(8..21u32);
                        let end = (start + rng.gen_range(1..=3u32)).min(22);
                        let mut req = request(&player, &court, "2025-06-01", "08:00", "09:00");
                        req.start_time = NaiveTime::from_hms_opt(start, 0, 0).unwrap();
                        req.end_time = NaiveTime::from_hms_opt(end, 0, 0).unwrap();
                        match engine.create_booking(&mut conn, &actor, req, early()) {
                            Ok(b) => mine.push(b.id),
                            Err(e) => assert_eq!(e.code(), "SLOT_TAKEN"),
                        }
                    }
                    assert_no_overlap(&conn, &court.id, date);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let conn = db::init_db(tmp.path()).unwrap();
    assert_no_overlap(&conn, &court.id, date);
}
