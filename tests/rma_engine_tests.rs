//! RMA 引擎集成测试
//! 覆盖：金额结算、库存往返、状态机闭合、可退余量守卫、顺序编号

use backoffice_system::error::AppError;
use backoffice_system::models::rma::*;
use rust_decimal::Decimal;
use uuid::Uuid;

mod common;
use common::*;

/// 构造一个标准测试场景：
/// 订单含商品 A（售价 100，数量 1），商品 B 备作换出（价 150，库存可调）
struct ExchangeFixture {
    pool: sqlx::PgPool,
    user_id: Uuid,
    product_a: Uuid,
    product_b: Uuid,
    order_id: Uuid,
    order_item: Uuid,
}

async fn setup_exchange_fixture(stock_b: i32) -> ExchangeFixture {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    let role_id = create_test_role(&pool, "ops", &["rma:write", "rma:complete"])
        .await
        .expect("Failed to create test role");
    let user_id = create_test_user(&pool, "Operator", "ops@example.com", "TestPass123", role_id)
        .await
        .expect("Failed to create test user");

    let product_a = create_test_product(&pool, "SKU-A", "Widget", 10)
        .await
        .expect("Failed to create product A");
    let product_b = create_test_product(&pool, "SKU-B", "Gadget", stock_b)
        .await
        .expect("Failed to create product B");

    let order_id = create_test_order(&pool, "ORD-1001")
        .await
        .expect("Failed to create order");
    let order_item = create_test_order_item(
        &pool,
        order_id,
        product_a,
        None,
        "SKU-A",
        1,
        Decimal::from(100),
    )
    .await
    .expect("Failed to create order item");

    ExchangeFixture {
        pool,
        user_id,
        product_a,
        product_b,
        order_id,
        order_item,
    }
}

fn exchange_request(fixture: &ExchangeFixture) -> CreateRmaRequest {
    CreateRmaRequest {
        order_id: fixture.order_id,
        rma_type: RmaType::Exchange,
        status: Some(RmaStatus::Approved),
        return_items: vec![RmaItemRequest {
            order_item_id: fixture.order_item,
            qty: 1,
        }],
        replacement_items: vec![RmaReplacementItemRequest {
            product_id: fixture.product_b,
            variant_id: None,
            qty: 1,
            unit_price: Decimal::from(150),
        }],
        payment_method: None,
        payment_reference: None,
        notes: None,
    }
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_happy_path_exchange_completion() {
    let fixture = setup_exchange_fixture(5).await;
    let service = create_rma_service(&fixture.pool);
    let actor = test_actor(fixture.user_id);

    let rma = service
        .create_rma(exchange_request(&fixture), &actor)
        .await
        .expect("RMA creation should succeed");

    // 金额结算：退 100、换出 150，差额 50 → 向客户补收
    assert_eq!(rma.subtotal_return, Decimal::from(100));
    assert_eq!(rma.subtotal_replacement, Decimal::from(150));
    assert_eq!(rma.difference, Decimal::from(50));
    assert_eq!(rma.settlement, RmaSettlement::ChargeCustomer);

    let completed = service
        .complete_rma(rma.id, &actor)
        .await
        .expect("completion should succeed");

    assert_eq!(completed.status, RmaStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert!(completed.cancelled_at.is_none());

    // 库存效果：A 补回 1，B 扣减 1
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_a).await, 11);
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_b).await, 4);

    // 审计：完成事件 + 逐行库存事件
    assert_eq!(count_audit_logs(&fixture.pool, "rma.complete").await, 1);
    assert_eq!(
        count_audit_logs(&fixture.pool, "inventory.restock_from_return").await,
        1
    );
    assert_eq!(
        count_audit_logs(&fixture.pool, "inventory.consume_for_exchange").await,
        1
    );
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_insufficient_stock_blocks_completion_entirely() {
    let fixture = setup_exchange_fixture(0).await;
    let service = create_rma_service(&fixture.pool);
    let actor = test_actor(fixture.user_id);

    let rma = service
        .create_rma(exchange_request(&fixture), &actor)
        .await
        .expect("RMA creation should succeed");

    let result = service.complete_rma(rma.id, &actor).await;

    match result {
        Err(AppError::InsufficientStock {
            sku,
            available,
            required,
        }) => {
            assert_eq!(sku, "SKU-B");
            assert_eq!(available, 0);
            assert_eq!(required, 1);
        }
        other => panic!("expected InsufficientStock, got {:?}", other.map(|r| r.status)),
    }

    // 全有或全无：任何一行失败都不得发生任何库存调整
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_a).await, 10);
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_b).await, 0);

    // 状态保持不变
    let unchanged = service.get_rma(rma.id).await.unwrap();
    assert_eq!(unchanged.status, RmaStatus::Approved);
    assert!(unchanged.completed_at.is_none());
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_cancel_with_revert_restores_stock() {
    let fixture = setup_exchange_fixture(5).await;
    let service = create_rma_service(&fixture.pool);
    let actor = test_actor(fixture.user_id);

    let rma = service
        .create_rma(exchange_request(&fixture), &actor)
        .await
        .unwrap();
    service.complete_rma(rma.id, &actor).await.unwrap();

    assert_eq!(get_product_stock(&fixture.pool, fixture.product_a).await, 11);
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_b).await, 4);

    let cancelled = service
        .cancel_rma(rma.id, true, &actor)
        .await
        .expect("cancel with revert should succeed");

    assert_eq!(cancelled.status, RmaStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert!(cancelled.completed_at.is_none());

    // APPLY 后 REVERT 必须是库存净零操作
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_a).await, 10);
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_b).await, 5);
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_cancel_without_revert_keeps_stock() {
    let fixture = setup_exchange_fixture(5).await;
    let service = create_rma_service(&fixture.pool);
    let actor = test_actor(fixture.user_id);

    let rma = service
        .create_rma(exchange_request(&fixture), &actor)
        .await
        .unwrap();
    service.complete_rma(rma.id, &actor).await.unwrap();

    service
        .cancel_rma(rma.id, false, &actor)
        .await
        .expect("cancel should succeed");

    // 未要求回滚时保留完成时的库存效果
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_a).await, 11);
    assert_eq!(get_product_stock(&fixture.pool, fixture.product_b).await, 4);
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_state_machine_closure() {
    let fixture = setup_exchange_fixture(5).await;
    let service = create_rma_service(&fixture.pool);
    let actor = test_actor(fixture.user_id);

    let rma = service
        .create_rma(exchange_request(&fixture), &actor)
        .await
        .unwrap();

    // 完成后不能再次完成
    service.complete_rma(rma.id, &actor).await.unwrap();
    assert!(matches!(
        service.complete_rma(rma.id, &actor).await,
        Err(AppError::InvalidState(_))
    ));

    // 取消后不能完成，也不能再次取消
    service.cancel_rma(rma.id, true, &actor).await.unwrap();
    assert!(matches!(
        service.complete_rma(rma.id, &actor).await,
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(
        service.cancel_rma(rma.id, false, &actor).await,
        Err(AppError::InvalidState(_))
    ));

    // 未知 ID → NotFound
    assert!(matches!(
        service.complete_rma(Uuid::new_v4(), &actor).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.cancel_rma(Uuid::new_v4(), false, &actor).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_returnable_quantity_guard_on_creation() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    let role_id = create_test_role(&pool, "ops", &["rma:write"]).await.unwrap();
    let user_id = create_test_user(&pool, "Operator", "ops@example.com", "TestPass123", role_id)
        .await
        .unwrap();

    let product = create_test_product(&pool, "SKU-A", "Widget", 10).await.unwrap();
    let order_id = create_test_order(&pool, "ORD-2001").await.unwrap();
    let order_item =
        create_test_order_item(&pool, order_id, product, None, "SKU-A", 5, Decimal::from(20))
            .await
            .unwrap();

    let service = create_rma_service(&pool);
    let actor = test_actor(user_id);

    let request = |qty| CreateRmaRequest {
        order_id,
        rma_type: RmaType::Return,
        status: Some(RmaStatus::Approved),
        return_items: vec![RmaItemRequest {
            order_item_id: order_item,
            qty,
        }],
        replacement_items: vec![],
        payment_method: None,
        payment_reference: None,
        notes: None,
    };

    // 先占用 2 件
    service.create_rma(request(2), &actor).await.unwrap();

    // 余量报告应为 3
    let report = service.returnable_report(order_id).await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].original_qty, 5);
    assert_eq!(report[0].max_returnable_qty, 3);

    // 超过余量被拒绝
    assert!(matches!(
        service.create_rma(request(4), &actor).await,
        Err(AppError::Validation(_))
    ));

    // 恰好用尽余量可以通过
    service.create_rma(request(3), &actor).await.unwrap();

    let report = service.returnable_report(order_id).await.unwrap();
    assert_eq!(report[0].max_returnable_qty, 0);
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_rma_numbers_are_sequential_and_formatted() {
    let fixture = setup_exchange_fixture(5).await;
    let service = create_rma_service(&fixture.pool);
    let actor = test_actor(fixture.user_id);

    // 订单行数量为 1，先建草稿（草稿不占用余量）再建第二张
    let mut request = exchange_request(&fixture);
    request.status = Some(RmaStatus::Draft);
    let first = service.create_rma(request, &actor).await.unwrap();

    let mut request = exchange_request(&fixture);
    request.status = Some(RmaStatus::Draft);
    let second = service.create_rma(request, &actor).await.unwrap();

    assert!(first.rma_number.starts_with("RMA-"));
    assert!(second.rma_number.starts_with("RMA-"));
    assert_ne!(first.rma_number, second.rma_number);

    let first_seq: i64 = first.rma_number[4..].parse().unwrap();
    let second_seq: i64 = second.rma_number[4..].parse().unwrap();
    assert!(second_seq > first_seq);
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_update_recomputes_money_and_respects_terminal_states() {
    let fixture = setup_exchange_fixture(5).await;
    let service = create_rma_service(&fixture.pool);
    let actor = test_actor(fixture.user_id);

    let rma = service
        .create_rma(exchange_request(&fixture), &actor)
        .await
        .unwrap();
    assert_eq!(rma.settlement, RmaSettlement::ChargeCustomer);

    // 把换出单价降到 100 → 差额归零 → Even
    let updated = service
        .update_rma(
            rma.id,
            UpdateRmaRequest {
                return_items: None,
                replacement_items: Some(vec![RmaReplacementItemRequest {
                    product_id: fixture.product_b,
                    variant_id: None,
                    qty: 1,
                    unit_price: Decimal::from(100),
                }]),
                payment_method: None,
                payment_reference: None,
                notes: Some("price matched".to_string()),
            },
            &actor,
        )
        .await
        .expect("update should succeed");

    assert_eq!(updated.difference, Decimal::ZERO);
    assert_eq!(updated.settlement, RmaSettlement::Even);
    assert_eq!(updated.notes.as_deref(), Some("price matched"));

    // 完成后禁止更新
    service.complete_rma(rma.id, &actor).await.unwrap();
    assert!(matches!(
        service
            .update_rma(
                rma.id,
                UpdateRmaRequest {
                    return_items: None,
                    replacement_items: None,
                    payment_method: None,
                    payment_reference: None,
                    notes: Some("too late".to_string()),
                },
                &actor,
            )
            .await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_change_status_primitive_guards() {
    let fixture = setup_exchange_fixture(5).await;
    let service = create_rma_service(&fixture.pool);
    let actor = test_actor(fixture.user_id);

    let mut request = exchange_request(&fixture);
    request.status = Some(RmaStatus::Draft);
    let rma = service.create_rma(request, &actor).await.unwrap();

    // draft → approved 通过原语
    let approved = service
        .change_status(rma.id, RmaStatus::Approved, &actor)
        .await
        .unwrap();
    assert_eq!(approved.status, RmaStatus::Approved);

    // 终态必须走专用操作
    assert!(matches!(
        service
            .change_status(rma.id, RmaStatus::Completed, &actor)
            .await,
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(
        service
            .change_status(rma.id, RmaStatus::Cancelled, &actor)
            .await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_variant_stock_is_used_when_variant_named() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    let role_id = create_test_role(&pool, "ops", &["rma:write", "rma:complete"])
        .await
        .unwrap();
    let user_id = create_test_user(&pool, "Operator", "ops@example.com", "TestPass123", role_id)
        .await
        .unwrap();

    let product_a = create_test_product(&pool, "SKU-A", "Widget", 10).await.unwrap();
    // 换出商品有变体：商品级库存充足，但变体库存不足
    let product_b = create_test_product(&pool, "SKU-B", "Gadget", 100).await.unwrap();
    let variant_b = create_test_variant(&pool, product_b, "Blue", 0).await.unwrap();

    let order_id = create_test_order(&pool, "ORD-3001").await.unwrap();
    let order_item =
        create_test_order_item(&pool, order_id, product_a, None, "SKU-A", 1, Decimal::from(50))
            .await
            .unwrap();

    let service = create_rma_service(&pool);
    let actor = test_actor(user_id);

    let rma = service
        .create_rma(
            CreateRmaRequest {
                order_id,
                rma_type: RmaType::Exchange,
                status: Some(RmaStatus::Approved),
                return_items: vec![RmaItemRequest {
                    order_item_id: order_item,
                    qty: 1,
                }],
                replacement_items: vec![RmaReplacementItemRequest {
                    product_id: product_b,
                    variant_id: Some(variant_b),
                    qty: 1,
                    unit_price: Decimal::from(50),
                }],
                payment_method: None,
                payment_reference: None,
                notes: None,
            },
            &actor,
        )
        .await
        .unwrap();

    // 指定变体时以变体库存为准
    assert!(matches!(
        service.complete_rma(rma.id, &actor).await,
        Err(AppError::InsufficientStock { available: 0, .. })
    ));

    // 补足变体库存后完成，扣减发生在变体上
    sqlx::query("UPDATE product_variants SET stock = 3 WHERE id = $1")
        .bind(variant_b)
        .execute(&pool)
        .await
        .unwrap();

    service.complete_rma(rma.id, &actor).await.unwrap();
    assert_eq!(get_variant_stock(&pool, variant_b).await, 2);
    assert_eq!(get_product_stock(&pool, product_b).await, 100);
    assert_eq!(get_product_stock(&pool, product_a).await, 11);
}
