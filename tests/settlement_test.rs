mod common;

use common::*;
use stride_events::{
    domain::{
        AuditQuery, CouponApplicability, CouponError, PaymentStatus, RegistrationPaymentStatus,
        RegistrationStatus, RegistrationType,
    },
    error::AppError,
    payments::FakeGateway,
    service::settlement_service::{ConfirmationProof, PaymentRequest, WebhookOutcome},
};

fn client_proof(order_id: &str, payment_id: &str) -> ConfirmationProof {
    ConfirmationProof::Client {
        gateway_payment_id: payment_id.to_string(),
        signature: FakeGateway::sign_payment(order_id, payment_id),
    }
}

async fn confirm_audits(t: &TestContext, payment_id: uuid::Uuid) -> anyhow::Result<usize> {
    let records = t.context.audit
        .query(&AuditQuery {
            event_type: Some("payment".to_string()),
            resource_id: Some(payment_id.to_string()),
            ..Default::default()
        })
        .await?;
    Ok(records.iter().filter(|r| r.action == "confirm").count())
}

#[tokio::test]
async fn test_full_price_registration_confirms_with_client_signature() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "asha@example.com", None), &actor())
        .await?;

    let payment = outcome.payment.unwrap();
    let order = outcome.order.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.final_amount, FEE);
    assert_eq!(order.amount, FEE);
    assert_eq!(outcome.registration.payment_status(), RegistrationPaymentStatus::Pending);
    assert_eq!(outcome.gateway_key.as_deref(), Some("fake_key_id"));

    let settled = t.context.settlement
        .confirm(&order.gateway_order_id, client_proof(&order.gateway_order_id, "pay_1"), &actor())
        .await?;
    assert_eq!(settled.status, PaymentStatus::Success);
    assert_eq!(settled.gateway_payment_id.as_deref(), Some("pay_1"));
    assert!(settled.paid_at.is_some());

    let registration = t.context.registration_service
        .get(RegistrationType::Student, outcome.registration.id())
        .await?;
    assert_eq!(registration.payment_status(), RegistrationPaymentStatus::Success);
    assert_eq!(registration.status(), RegistrationStatus::Confirmed);
    assert_eq!(t.recorder.payment_confirmations(), 1);
    Ok(())
}

#[tokio::test]
async fn test_full_waiver_settles_without_gateway() -> anyhow::Result<()> {
    let t = setup().await?;
    standard_coupons(&t.context).await?;

    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "free@example.com", Some("KEEPSTRIDING")), &actor())
        .await?;

    let payment = outcome.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.final_amount, 0);
    assert_eq!(payment.discount_amount, FEE);
    assert!(payment.gateway_order_id.starts_with("free_"));
    assert!(outcome.order.is_none());
    assert_eq!(t.gateway.orders_created(), 0);

    assert_eq!(outcome.registration.payment_status(), RegistrationPaymentStatus::Success);
    assert_eq!(outcome.registration.status(), RegistrationStatus::Confirmed);

    let coupon = t.context.coupon_repo.find_active_by_code("KEEPSTRIDING").await?.unwrap();
    assert_eq!(coupon.used_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_half_price_coupon_sets_order_amount() -> anyhow::Result<()> {
    let t = setup().await?;
    standard_coupons(&t.context).await?;

    let outcome = t.context.registration_service
        .register_school(school(t.event.id, "office@bis.example", Some("EARLYBIRD")), &actor())
        .await?;

    let payment = outcome.payment.unwrap();
    assert_eq!(payment.amount, FEE);
    assert_eq!(payment.discount_amount, 4950);
    assert_eq!(payment.final_amount, 4950);
    assert_eq!(outcome.order.unwrap().amount, 4950);
    assert_eq!(t.gateway.orders_created(), 1);

    // Not redeemed until the payment succeeds.
    let coupon = t.context.coupon_repo.find_active_by_code("EARLYBIRD").await?.unwrap();
    assert_eq!(coupon.used_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_repeated_confirmation_is_idempotent() -> anyhow::Result<()> {
    let t = setup().await?;
    standard_coupons(&t.context).await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "twice@example.com", Some("EARLYBIRD")), &actor())
        .await?;
    let order_id = outcome.order.unwrap().gateway_order_id;

    let first = t.context.settlement
        .confirm(&order_id, client_proof(&order_id, "pay_1"), &actor())
        .await?;
    let second = t.context.settlement
        .confirm(&order_id, client_proof(&order_id, "pay_1"), &actor())
        .await?;

    assert_eq!(first.id, second.id);
    assert_eq!(second.status, PaymentStatus::Success);
    assert_eq!(first.paid_at, second.paid_at);
    assert_eq!(confirm_audits(&t, first.id).await?, 1);
    assert_eq!(t.recorder.payment_confirmations(), 1);

    let coupon = t.context.coupon_repo.find_active_by_code("EARLYBIRD").await?.unwrap();
    assert_eq!(coupon.used_count, 1);
    Ok(())
}

/// Runs the client confirmation and the captured webhook for one new
/// registration as two spawned tasks, and checks it settled exactly once.
async fn race_client_and_webhook(t: &TestContext, email: &str, payment_id: &str) -> anyhow::Result<()> {
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, email, Some("EARLYBIRD")), &actor())
        .await?;
    let payment = outcome.payment.unwrap();
    let order_id = payment.gateway_order_id.clone();

    let (body, signature) =
        FakeGateway::captured_webhook(&payment.transaction_reference, payment_id, payment.final_amount);

    let client = {
        let settlement = t.context.settlement.clone();
        let order_id = order_id.clone();
        let proof = client_proof(&order_id, payment_id);
        tokio::spawn(async move { settlement.confirm(&order_id, proof, &actor()).await })
    };
    let webhook = {
        let settlement = t.context.settlement.clone();
        tokio::spawn(async move { settlement.handle_webhook(&body, &signature).await })
    };

    assert_eq!(client.await??.status, PaymentStatus::Success);
    assert!(matches!(
        webhook.await??,
        WebhookOutcome::Settled(p) | WebhookOutcome::AlreadySettled(p) if p.status == PaymentStatus::Success
    ));
    assert_eq!(confirm_audits(t, payment.id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_racing_client_and_webhook_settle_once() -> anyhow::Result<()> {
    let t = setup().await?;
    standard_coupons(&t.context).await?;

    race_client_and_webhook(&t, "race@example.com", "pay_1").await?;

    assert_eq!(t.recorder.payment_confirmations(), 1);
    let coupon = t.context.coupon_repo.find_active_by_code("EARLYBIRD").await?.unwrap();
    assert_eq!(coupon.used_count, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_settlement_across_connections() -> anyhow::Result<()> {
    let t = setup_with_pool(shared_pool(4).await?).await?;
    standard_coupons(&t.context).await?;

    let rounds = 8;
    for round in 0..rounds {
        race_client_and_webhook(
            &t,
            &format!("race{}@example.com", round),
            &format!("pay_race_{}", round),
        )
        .await?;
    }

    assert_eq!(t.recorder.payment_confirmations(), rounds);
    let coupon = t.context.coupon_repo.find_active_by_code("EARLYBIRD").await?.unwrap();
    assert_eq!(coupon.used_count, rounds as i64);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_gateway_leaves_payment_pending() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "outage@example.com", None), &actor())
        .await?;
    let payment = outcome.payment.unwrap();
    let order_id = payment.gateway_order_id.clone();

    t.gateway.set_verification_unavailable(true);
    let result = t.context.settlement
        .confirm(&order_id, client_proof(&order_id, "pay_1"), &actor())
        .await;
    assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));

    let stored = t.context.settlement.get(payment.id).await?;
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(stored.error_message.is_none());
    let registration = t.context.registration_service
        .get(RegistrationType::Student, outcome.registration.id())
        .await?;
    assert_eq!(registration.payment_status(), RegistrationPaymentStatus::Pending);

    // The webhook still settles it once the gateway reports the capture.
    let (body, signature) =
        FakeGateway::captured_webhook(&payment.transaction_reference, "pay_1", payment.final_amount);
    let settled = t.context.settlement.handle_webhook(&body, &signature).await?;
    assert!(matches!(settled, WebhookOutcome::Settled(p) if p.status == PaymentStatus::Success));
    Ok(())
}

#[tokio::test]
async fn test_in_flight_payment_waits_for_webhook() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "3ds@example.com", None), &actor())
        .await?;
    let payment = outcome.payment.unwrap();
    let order_id = payment.gateway_order_id.clone();

    t.gateway.set_verification_in_flight(true);
    let pending = t.context.settlement
        .confirm(&order_id, client_proof(&order_id, "pay_1"), &actor())
        .await?;
    assert_eq!(pending.status, PaymentStatus::Pending);
    assert_eq!(confirm_audits(&t, payment.id).await?, 0);
    assert_eq!(t.recorder.payment_confirmations(), 0);

    let (body, signature) =
        FakeGateway::captured_webhook(&payment.transaction_reference, "pay_1", payment.final_amount);
    t.context.settlement.handle_webhook(&body, &signature).await?;

    let settled = t.context.settlement.get(payment.id).await?;
    assert_eq!(settled.status, PaymentStatus::Success);
    assert_eq!(t.recorder.payment_confirmations(), 1);
    Ok(())
}

#[tokio::test]
async fn test_bad_signature_fails_payment() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "forged@example.com", None), &actor())
        .await?;
    let order_id = outcome.order.unwrap().gateway_order_id;

    let forged = ConfirmationProof::Client {
        gateway_payment_id: "pay_1".to_string(),
        signature: "00".repeat(32),
    };
    let result = t.context.settlement.confirm(&order_id, forged, &actor()).await;
    assert!(matches!(result, Err(AppError::PaymentVerificationFailed(_))));

    let payment = t.context.settlement.find_by_order(&order_id).await?;
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.error_message.is_some());

    let registration = t.context.registration_service
        .get(RegistrationType::Student, outcome.registration.id())
        .await?;
    assert_eq!(registration.payment_status(), RegistrationPaymentStatus::Failed);
    assert_eq!(registration.status(), RegistrationStatus::Pending);

    // A failed payment is terminal; a later valid proof changes nothing.
    let after = t.context.settlement
        .confirm(&order_id, client_proof(&order_id, "pay_1"), &actor())
        .await?;
    assert_eq!(after.status, PaymentStatus::Failed);
    assert_eq!(t.recorder.payment_confirmations(), 0);
    Ok(())
}

#[tokio::test]
async fn test_invalid_coupon_leaves_no_rows() -> anyhow::Result<()> {
    let t = setup().await?;
    let mut expired = coupon_request("LASTYEAR", 50, CouponApplicability::All, None);
    expired.valid_until = chrono::Utc::now() - chrono::Duration::days(1);
    t.context.coupon_repo.create(expired).await?;

    let result = t.context.registration_service
        .register_student(student(t.event.id, "late@example.com", Some("LASTYEAR")), &actor())
        .await;
    assert!(matches!(result, Err(AppError::Coupon(CouponError::Expired))));

    assert_eq!(count(&t.pool, "payments").await?, 0);
    assert_eq!(count(&t.pool, "student_registrations").await?, 0);
    assert_eq!(t.gateway.orders_created(), 0);
    Ok(())
}

#[tokio::test]
async fn test_gateway_outage_leaves_no_rows() -> anyhow::Result<()> {
    let t = setup().await?;
    t.gateway.set_unavailable(true);

    let result = t.context.registration_service
        .register_student(student(t.event.id, "down@example.com", None), &actor())
        .await;
    assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));
    assert_eq!(count(&t.pool, "payments").await?, 0);
    assert_eq!(count(&t.pool, "student_registrations").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_deactivated_coupon_keeps_priced_amount() -> anyhow::Result<()> {
    let t = setup().await?;
    let coupon = create_coupon(&t.context, "FLASH", 50, CouponApplicability::All, None).await?;

    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "flash@example.com", Some("FLASH")), &actor())
        .await?;
    t.context.coupon_repo.set_active(coupon.id, false).await?;

    let order_id = outcome.order.unwrap().gateway_order_id;
    let settled = t.context.settlement
        .confirm(&order_id, client_proof(&order_id, "pay_1"), &actor())
        .await?;
    assert_eq!(settled.final_amount, 4950);
    assert_eq!(settled.coupon_id, Some(coupon.id));

    let stored = t.context.coupon_ledger.get(coupon.id).await?.unwrap();
    assert_eq!(stored.used_count, 1);
    assert!(!stored.is_active);
    Ok(())
}

#[tokio::test]
async fn test_coupon_over_cap_is_recorded_as_anomaly() -> anyhow::Result<()> {
    let t = setup().await?;
    let coupon = create_coupon(&t.context, "ONLYONE", 50, CouponApplicability::All, Some(1)).await?;

    // Both price the coupon before either payment settles.
    let a = t.context.registration_service
        .register_student(student(t.event.id, "a@example.com", Some("ONLYONE")), &actor())
        .await?;
    let b = t.context.registration_service
        .register_student(student(t.event.id, "b@example.com", Some("ONLYONE")), &actor())
        .await?;

    for (outcome, gateway_payment_id) in [(a, "pay_a"), (b, "pay_b")] {
        let order_id = outcome.order.unwrap().gateway_order_id;
        let settled = t.context.settlement
            .confirm(&order_id, client_proof(&order_id, gateway_payment_id), &actor())
            .await?;
        assert_eq!(settled.status, PaymentStatus::Success);
    }

    let stored = t.context.coupon_ledger.get(coupon.id).await?.unwrap();
    assert_eq!(stored.used_count, 1);

    let records = t.context.audit
        .query(&AuditQuery {
            event_type: Some("coupon".to_string()),
            resource_id: Some(coupon.id.to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|r| r.status == "anomaly").count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_captured_webhook_settles_and_redelivery_is_noop() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "hook@example.com", None), &actor())
        .await?;
    let payment = outcome.payment.unwrap();

    let (body, signature) =
        FakeGateway::captured_webhook(&payment.transaction_reference, "pay_w", FEE);

    let first = t.context.settlement.handle_webhook(&body, &signature).await?;
    let WebhookOutcome::Settled(settled) = first else {
        panic!("expected settled, got {:?}", first);
    };
    assert_eq!(settled.status, PaymentStatus::Success);
    assert_eq!(settled.gateway_payment_id.as_deref(), Some("pay_w"));

    let again = t.context.settlement.handle_webhook(&body, &signature).await?;
    assert!(matches!(again, WebhookOutcome::AlreadySettled(_)));
    assert_eq!(confirm_audits(&t, payment.id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_webhook_amount_mismatch_fails_payment() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "short@example.com", None), &actor())
        .await?;
    let payment = outcome.payment.unwrap();

    let (body, signature) =
        FakeGateway::captured_webhook(&payment.transaction_reference, "pay_w", 100);

    let result = t.context.settlement.handle_webhook(&body, &signature).await?;
    let WebhookOutcome::Settled(failed) = result else {
        panic!("expected settled, got {:?}", result);
    };
    assert_eq!(failed.status, PaymentStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_failed_webhook_marks_payment_failed() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "declined@example.com", None), &actor())
        .await?;
    let payment = outcome.payment.unwrap();

    let (body, signature) =
        FakeGateway::failed_webhook(&payment.transaction_reference, "pay_f", "Card declined");
    t.context.settlement.handle_webhook(&body, &signature).await?;

    let failed = t.context.settlement.get(payment.id).await?;
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("Card declined"));

    let registration = t.context.registration_service
        .get(RegistrationType::Student, outcome.registration.id())
        .await?;
    assert_eq!(registration.payment_status(), RegistrationPaymentStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_webhook_for_unknown_order_changes_nothing() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "other@example.com", None), &actor())
        .await?;

    let (body, signature) = FakeGateway::captured_webhook("no-such-reference", "pay_u", FEE);
    let result = t.context.settlement.handle_webhook(&body, &signature).await?;
    assert!(matches!(result, WebhookOutcome::UnknownOrder(Some(ref r)) if r == "no-such-reference"));

    let untouched = t.context.settlement.get(outcome.payment.unwrap().id).await?;
    assert_eq!(untouched.status, PaymentStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn test_tampered_webhook_is_rejected() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "tamper@example.com", None), &actor())
        .await?;
    let payment = outcome.payment.unwrap();

    let (_, signature) = FakeGateway::captured_webhook(&payment.transaction_reference, "pay_t", FEE);
    let (other_body, _) = FakeGateway::captured_webhook(&payment.transaction_reference, "pay_t", 1);

    let result = t.context.settlement.handle_webhook(&other_body, &signature).await;
    assert!(matches!(result, Err(AppError::InvalidWebhookSignature)));

    let untouched = t.context.settlement.get(payment.id).await?;
    assert_eq!(untouched.status, PaymentStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn test_initiate_for_missing_registration_leaves_no_payment() -> anyhow::Result<()> {
    let t = setup().await?;

    let result = t.context.settlement
        .initiate(PaymentRequest {
            registration_id: uuid::Uuid::new_v4(),
            registration_type: RegistrationType::Student,
            event_id: t.event.id,
            amount: FEE,
            coupon_code: None,
            actor: actor(),
        })
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(count(&t.pool, "payments").await?, 0);
    Ok(())
}
