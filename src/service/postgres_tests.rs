// Service tests against a live Postgres.
// Run with: DATABASE_URL=... cargo test -- --ignored
use std::sync::Arc;

use axum::http::StatusCode;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    types::BigDecimal,
};
use uuid::Uuid;

use crate::{
    db::{disputedb::DisputeExt, orderdb::OrderExt, userdb::UserExt, DBClient},
    dtos::{
        disputedtos::ResolveDisputeDto,
        orderdtos::{CreateDeliverableDto, CreateOrderDto},
        withdrawaldtos::{CreateWithdrawalDto, CreateWithdrawalMethodDto},
    },
    models::{
        disputemodel::ResolutionType,
        ordermodel::{DeliverableStatus, Order, OrderStatus, OrderType, PackageTier, PaymentStatus},
        usermodel::{User, UserRole},
        withdrawalmodel::WithdrawalMethodType,
    },
    service::{
        audit_service::{AuditService, EVENT_ORDER_PLACED},
        dispute_service::DisputeService,
        error::ServiceError,
        milestone_service::MilestoneService,
        order_service::OrderService,
        order_state::OrderAction,
        withdrawal_service::WithdrawalService,
    },
};

struct Market {
    db: Arc<DBClient>,
    orders: OrderService,
    disputes: DisputeService,
    milestones: MilestoneService,
    withdrawals: WithdrawalService,
    client: User,
    freelancer: User,
}

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

async fn user(db: &DBClient, role: UserRole) -> User {
    let tag = Uuid::new_v4().simple().to_string();
    db.save_user(
        format!("Test {}", role.to_str()),
        format!("{}_{}", role.to_str(), &tag[..12]),
        format!("{}@example.com", tag),
        "$argon2id$unused".to_string(),
        role,
    )
    .await
    .expect("save user")
}

async fn market() -> Market {
    let db = Arc::new(DBClient::new(connect().await));
    let audit = Arc::new(AuditService::new(db.clone()));

    Market {
        orders: OrderService::new(db.clone(), audit.clone()),
        disputes: DisputeService::new(db.clone(), audit),
        milestones: MilestoneService::new(db.clone()),
        withdrawals: WithdrawalService::new(db.clone()),
        client: user(&db, UserRole::Client).await,
        freelancer: user(&db, UserRole::Freelancer).await,
        db,
    }
}

impl Market {
    async fn listing(&self, tier: PackageTier) -> Uuid {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO services (freelancer_id, title, package_tier, price) VALUES ($1, 'Logo design', $2, 500) RETURNING id",
        )
        .bind(self.freelancer.id)
        .bind(tier)
        .fetch_one(&self.db.pool)
        .await
        .expect("insert service")
    }

    async fn place(&self, order_type: OrderType, milestone_count: Option<i32>) -> Order {
        let service_id = self.listing(PackageTier::Basic).await;
        let body = CreateOrderDto {
            service_id,
            total_price: BigDecimal::from(500),
            order_type: Some(order_type),
            requirements: None,
            required_hours: None,
            delivery_date: None,
            milestone_count,
            milestone_delivery_date: None,
            addon_service_ids: Vec::new(),
        };
        let placed = self.orders.place_order(&self.client, body).await.expect("place order");
        self.orders.get_order(placed.order.order.id).await.expect("reload order")
    }

    async fn accepted(&self) -> Order {
        let order = self.place(OrderType::Small, None).await;
        self.orders
            .accept_order(self.freelancer.id, order.id)
            .await
            .expect("accept")
    }

    async fn delivered(&self) -> Order {
        let order = self.accepted().await;
        self.orders
            .deliver_order(self.freelancer.id, order.id, None)
            .await
            .expect("deliver");
        self.orders.get_order(order.id).await.expect("reload order")
    }

    async fn balance(&self, user_id: Uuid) -> BigDecimal {
        self.db
            .get_user(Some(user_id), None, None)
            .await
            .expect("load user")
            .expect("user exists")
            .wallet_balance
    }
}

fn ok_count<T>(results: &[Result<T, ServiceError>]) -> usize {
    for result in results {
        if let Err(e) = result {
            assert_ne!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR, "{e}");
        }
    }
    results.iter().filter(|r| r.is_ok()).count()
}

async fn join_all<T: Send + 'static>(
    handles: Vec<tokio::task::JoinHandle<Result<T, ServiceError>>>,
) -> Vec<Result<T, ServiceError>> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("task panicked"));
    }
    results
}

#[tokio::test]
#[ignore = "requires database"]
async fn cancel_refunds_the_payment_without_crediting_the_client() {
    let m = market().await;
    let order = m.place(OrderType::Small, None).await;

    let cancelled = m.orders.cancel_order(m.client.id, order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    assert_eq!(m.balance(m.client.id).await, BigDecimal::from(0));
    let payment = m.db.get_payment(order.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunded_amount, BigDecimal::from(500));
    assert_eq!(payment.released_amount, BigDecimal::from(0));

    let events = m.db.get_order_events(order.id).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&EVENT_ORDER_PLACED), "{types:?}");
    assert!(types.contains(&OrderAction::Cancel.event_type()), "{types:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires database"]
async fn concurrent_completions_release_escrow_once() {
    let m = market().await;
    let order = m.delivered().await;
    let order_id = order.id;

    let handles = (0..8)
        .map(|_| {
            let orders = m.orders.clone();
            let client_id = m.client.id;
            tokio::spawn(async move { orders.complete_order(client_id, order_id).await })
        })
        .collect();
    let results = join_all(handles).await;

    assert_eq!(ok_count(&results), 1);
    assert_eq!(m.balance(m.freelancer.id).await, BigDecimal::from(500));
    assert_eq!(m.balance(m.client.id).await, BigDecimal::from(0));

    let payment = m.db.get_payment(order.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Released);
    assert_eq!(payment.released_amount, BigDecimal::from(500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires database"]
async fn last_revision_slot_goes_to_one_request() {
    let m = market().await;
    let order = m.delivered().await;
    assert_eq!(order.included_revision_limit, Some(1));
    let order_id = order.id;

    let handles = (0..10)
        .map(|i| {
            let orders = m.orders.clone();
            let client_id = m.client.id;
            tokio::spawn(async move {
                orders
                    .request_revision(client_id, order_id, format!("Change number {i}"))
                    .await
            })
        })
        .collect();
    let results = join_all(handles).await;

    assert_eq!(ok_count(&results), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err.status_code(), StatusCode::BAD_REQUEST | StatusCode::CONFLICT),
            "{err}"
        );
    }

    let reloaded = m.orders.get_order(order.id).await.unwrap();
    assert_eq!(reloaded.revision_count, 1);
    assert_eq!(reloaded.status, OrderStatus::RevisionRequested);
    assert_eq!(m.db.get_revisions(order.id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires database"]
async fn concurrent_withdrawals_never_overdraw() {
    let m = market().await;
    sqlx::query("UPDATE users SET wallet_balance = 100 WHERE id = $1")
        .bind(m.freelancer.id)
        .execute(&m.db.pool)
        .await
        .unwrap();

    let method = m
        .withdrawals
        .add_method(
            m.freelancer.id,
            CreateWithdrawalMethodDto {
                method_type: WithdrawalMethodType::Paypal,
                account_holder_name: "Test Freelancer".to_string(),
                account_number: None,
                bank_name: None,
                swift_code: None,
                paypal_email: Some("payouts@example.com".to_string()),
                is_default: true,
            },
        )
        .await
        .unwrap();

    let handles = (0..10)
        .map(|_| {
            let withdrawals = m.withdrawals.clone();
            let freelancer_id = m.freelancer.id;
            let body = CreateWithdrawalDto {
                withdrawal_method_id: method.id,
                amount: BigDecimal::from(60),
            };
            tokio::spawn(async move { withdrawals.request_withdrawal(freelancer_id, body).await })
        })
        .collect();
    let results = join_all(handles).await;

    assert_eq!(ok_count(&results), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ServiceError::InsufficientBalance { .. })));
    assert_eq!(m.balance(m.freelancer.id).await, BigDecimal::from(40));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires database"]
async fn dispute_resolves_once_and_records_the_resolving_admin() {
    let m = market().await;
    let assignee = user(&m.db, UserRole::Admin).await;
    let resolver = user(&m.db, UserRole::Admin).await;
    let order = m.accepted().await;

    let dispute = m
        .disputes
        .open_dispute(m.client.id, order.id, "The work was never started".to_string())
        .await
        .unwrap();
    m.disputes
        .assign_dispute(assignee.id, dispute.id, None)
        .await
        .unwrap();

    let handles = (0..6)
        .map(|_| {
            let disputes = m.disputes.clone();
            let body = ResolveDisputeDto {
                resolution_type: ResolutionType::Release,
                message: Some("Work accepted".to_string()),
                client_amount: None,
                freelancer_amount: None,
            };
            let (admin_id, dispute_id) = (resolver.id, dispute.id);
            tokio::spawn(async move { disputes.resolve_dispute(admin_id, dispute_id, body).await })
        })
        .collect();
    let results = join_all(handles).await;

    assert_eq!(ok_count(&results), 1);

    let resolved = m.db.get_dispute(dispute.id).await.unwrap().unwrap();
    assert_eq!(resolved.admin_id, Some(resolver.id));

    assert_eq!(m.balance(m.freelancer.id).await, BigDecimal::from(500));
    assert_eq!(m.balance(m.client.id).await, BigDecimal::from(0));
    let reloaded = m.orders.get_order(order.id).await.unwrap();
    assert_eq!(reloaded.status, OrderStatus::Completed);
}

#[tokio::test]
#[ignore = "requires database"]
async fn refund_resolution_leaves_wallets_untouched() {
    let m = market().await;
    let admin = user(&m.db, UserRole::Admin).await;
    let order = m.accepted().await;

    let dispute = m
        .disputes
        .open_dispute(m.client.id, order.id, "Nothing was delivered on time".to_string())
        .await
        .unwrap();

    let body = ResolveDisputeDto {
        resolution_type: ResolutionType::Refund,
        message: None,
        client_amount: None,
        freelancer_amount: None,
    };
    m.disputes.resolve_dispute(admin.id, dispute.id, body).await.unwrap();

    assert_eq!(m.balance(m.client.id).await, BigDecimal::from(0));
    assert_eq!(m.balance(m.freelancer.id).await, BigDecimal::from(0));
    let payment = m.db.get_payment(order.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunded_amount, BigDecimal::from(500));
}

#[tokio::test]
#[ignore = "requires database"]
async fn completing_a_milestone_advances_the_current_phase() {
    let m = market().await;
    let order = m.place(OrderType::Big, Some(2)).await;
    m.orders.accept_order(m.freelancer.id, order.id).await.unwrap();

    let plan = |description: &str, amount: i32| CreateDeliverableDto {
        description: description.to_string(),
        due_date: None,
        payment_amount: Some(BigDecimal::from(amount)),
    };

    let first = m
        .milestones
        .add_deliverable(m.freelancer.id, order.id, plan("Wireframes", 200))
        .await
        .unwrap();
    let second = m
        .milestones
        .add_deliverable(m.freelancer.id, order.id, plan("Final artwork", 300))
        .await
        .unwrap();
    assert_eq!((first.phase, second.phase), (1, 2));

    let extra = m
        .milestones
        .add_deliverable(m.freelancer.id, order.id, plan("Extras", 0))
        .await
        .unwrap_err();
    assert_eq!(extra.status_code(), StatusCode::BAD_REQUEST);

    let updated = m
        .milestones
        .update_deliverable_status(m.freelancer.id, order.id, first.id, DeliverableStatus::Completed)
        .await
        .unwrap();
    assert_eq!(updated.deliverable.status, DeliverableStatus::Completed);
    assert_eq!(updated.order.order.current_phase, Some(2));

    let events = m.db.get_order_events(order.id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "deliverable_updated"));
}
