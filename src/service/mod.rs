pub mod audit_service;
pub mod coupon_ledger;
pub mod event_service;
pub mod registration_service;
pub mod settlement_service;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::notifications::NotificationManager;
use crate::payments::PaymentGateway;
use crate::repository::*;
use audit_service::AuditRecorder;
use coupon_ledger::CouponLedger;
use event_service::EventService;
use registration_service::RegistrationService;
use settlement_service::SettlementEngine;

pub struct ServiceContext {
    pub event_repo: Arc<dyn EventRepository>,
    pub coupon_repo: Arc<dyn CouponRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub registration_repo: Arc<dyn RegistrationRepository>,
    pub coupon_ledger: Arc<CouponLedger>,
    pub event_service: Arc<EventService>,
    pub audit: Arc<AuditRecorder>,
    pub settlement: Arc<SettlementEngine>,
    pub registration_service: Arc<RegistrationService>,
    pub notifications: Arc<NotificationManager>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        gateway: Arc<dyn PaymentGateway>,
        notifications: Arc<NotificationManager>,
    ) -> Self {
        let event_repo: Arc<dyn EventRepository> = Arc::new(SqliteEventRepository::new(db_pool.clone()));
        let coupon_repo: Arc<dyn CouponRepository> = Arc::new(SqliteCouponRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let registration_repo: Arc<dyn RegistrationRepository> =
            Arc::new(SqliteRegistrationRepository::new(db_pool.clone()));
        let audit_repo: Arc<dyn AuditRepository> = Arc::new(SqliteAuditRepository::new(db_pool.clone()));

        let coupon_ledger = Arc::new(CouponLedger::new(coupon_repo.clone()));
        let audit = Arc::new(AuditRecorder::new(audit_repo));
        let event_service = Arc::new(EventService::new(event_repo.clone(), audit.clone()));

        let settlement = Arc::new(SettlementEngine::new(
            payment_repo.clone(),
            registration_repo.clone(),
            event_repo.clone(),
            coupon_ledger.clone(),
            gateway,
            audit.clone(),
            notifications.clone(),
        ));

        let registration_service = Arc::new(RegistrationService::new(
            registration_repo.clone(),
            event_repo.clone(),
            settlement.clone(),
            audit.clone(),
            notifications.clone(),
        ));

        Self {
            event_repo,
            coupon_repo,
            payment_repo,
            registration_repo,
            coupon_ledger,
            event_service,
            audit,
            settlement,
            registration_service,
            notifications,
            db_pool,
        }
    }
}
