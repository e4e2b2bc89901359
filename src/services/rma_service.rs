//! RMA 引擎服务
//!
//! 退换货生命周期：draft → approved → completed，cancelled 可从任意状态
//! 进入（含事后冲正已完成的 RMA）。完成与取消在单个数据库事务内执行
//! 状态迁移、库存调整与审计写入；库存检查与扣减之间由行锁串行化。

use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::order::{OrderItem, ReturnableItem};
use crate::models::rma::*;
use crate::repository::{OrderRepository, ProductRepository, RmaRepository};
use crate::services::audit_service::{Actor, AuditAction, AuditLogParams, AuditService};
use crate::repository::audit_repo::AuditRepository;

/// RMA 服务
pub struct RmaService {
    db: PgPool,
    audit_service: Arc<AuditService>,
}

impl RmaService {
    pub fn new(db: PgPool, audit_service: Arc<AuditService>) -> Self {
        Self { db, audit_service }
    }

    /// 创建 RMA
    ///
    /// 分配顺序编号，校验每条退货行不超过该订单行的可退余量
    /// （approved/completed 状态的既有 RMA 计入占用），按销售时单价
    /// 冻结退货行快照，并重算金额结算。
    #[instrument(skip(self, req, actor))]
    pub async fn create_rma(&self, req: CreateRmaRequest, actor: &Actor) -> Result<Rma> {
        let status = req.status.unwrap_or(RmaStatus::Draft);
        if !matches!(status, RmaStatus::Draft | RmaStatus::Approved) {
            return Err(AppError::validation(
                "A new RMA must start as draft or approved",
            ));
        }

        if req.return_items.is_empty() {
            return Err(AppError::validation(
                "An RMA must contain at least one return item",
            ));
        }

        let order_repo = OrderRepository::new(self.db.clone());
        let order = order_repo
            .find_by_id(&req.order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order not found"))?;
        let order_items = order_repo.find_items(&req.order_id).await?;

        let rma_repo = RmaRepository::new(self.db.clone());
        let order_rmas = rma_repo.list_by_order(&req.order_id).await?;

        let return_items =
            Self::build_return_items(&req.return_items, &order_items, &order_rmas, None)?;
        let replacement_items = self.build_replacement_items(&req.replacement_items).await?;

        let money = compute_rma_money(&return_items, &replacement_items);
        let rma_number = rma_repo.next_rma_number().await?;

        let rma = rma_repo
            .insert(&NewRma {
                rma_number,
                rma_type: req.rma_type,
                status,
                order_id: order.id,
                order_number: order.order_number.clone(),
                return_items,
                replacement_items,
                money,
                payment_method: req.payment_method,
                payment_reference: req.payment_reference,
                notes: req.notes,
                created_by: actor.id,
            })
            .await?;

        self.audit_service
            .log_action(AuditLogParams {
                actor,
                action: AuditAction::RmaCreate,
                entity_type: Some("rma"),
                entity_id: Some(rma.id),
                entity_name: Some(&rma.rma_number),
                changes: None,
                metadata: Some(serde_json::json!({
                    "rma_type": rma.rma_type,
                    "order_id": rma.order_id,
                    "order_number": rma.order_number,
                })),
            })
            .await?;

        info!(rma_id = %rma.id, rma_number = %rma.rma_number, "RMA created");
        Ok(rma)
    }

    /// 更新 RMA（仅限非终态）
    ///
    /// 行项变更会重新冻结快照、重新校验可退余量（排除自身）并重算金额。
    #[instrument(skip(self, req, actor))]
    pub async fn update_rma(&self, id: Uuid, req: UpdateRmaRequest, actor: &Actor) -> Result<Rma> {
        let rma_repo = RmaRepository::new(self.db.clone());
        let mut rma = rma_repo
            .find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found("RMA not found"))?;

        if matches!(rma.status, RmaStatus::Completed | RmaStatus::Cancelled) {
            return Err(AppError::invalid_state(
                "Cannot update a completed or cancelled RMA",
            ));
        }

        let mut changed_fields: Vec<&str> = Vec::new();

        if let Some(return_item_reqs) = &req.return_items {
            if return_item_reqs.is_empty() {
                return Err(AppError::validation(
                    "An RMA must contain at least one return item",
                ));
            }

            let order_repo = OrderRepository::new(self.db.clone());
            let order_items = order_repo.find_items(&rma.order_id).await?;
            let order_rmas = rma_repo.list_by_order(&rma.order_id).await?;

            rma.return_items.0 =
                Self::build_return_items(return_item_reqs, &order_items, &order_rmas, Some(id))?;
            changed_fields.push("return_items");
        }

        if let Some(replacement_reqs) = &req.replacement_items {
            rma.replacement_items.0 = self.build_replacement_items(replacement_reqs).await?;
            changed_fields.push("replacement_items");
        }

        if let Some(payment_method) = req.payment_method {
            rma.payment_method = Some(payment_method);
            changed_fields.push("payment_method");
        }
        if let Some(payment_reference) = req.payment_reference {
            rma.payment_reference = Some(payment_reference);
            changed_fields.push("payment_reference");
        }
        if let Some(notes) = req.notes {
            rma.notes = Some(notes);
            changed_fields.push("notes");
        }

        // 行项任何变化都必须重算金额，派生值不允许漂移
        let money = compute_rma_money(&rma.return_items.0, &rma.replacement_items.0);
        rma.subtotal_return = money.subtotal_return;
        rma.subtotal_replacement = money.subtotal_replacement;
        rma.difference = money.difference;
        rma.settlement = money.settlement;

        let saved = rma_repo.save(&rma).await?;

        self.audit_service
            .log_action(AuditLogParams {
                actor,
                action: AuditAction::RmaUpdate,
                entity_type: Some("rma"),
                entity_id: Some(saved.id),
                entity_name: Some(&saved.rma_number),
                changes: Some(serde_json::json!({ "fields": changed_fields })),
                metadata: None,
            })
            .await?;

        Ok(saved)
    }

    /// 低层状态变更原语
    ///
    /// 只在非终态之间迁移；completed/cancelled 由专用操作负责，
    /// 绕过它们会破坏库存对账。
    #[instrument(skip(self, actor))]
    pub async fn change_status(
        &self,
        id: Uuid,
        new_status: RmaStatus,
        actor: &Actor,
    ) -> Result<Rma> {
        if matches!(new_status, RmaStatus::Completed | RmaStatus::Cancelled) {
            return Err(AppError::invalid_state(
                "Completion and cancellation have dedicated operations",
            ));
        }

        let rma_repo = RmaRepository::new(self.db.clone());
        let rma = rma_repo
            .find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found("RMA not found"))?;

        if matches!(rma.status, RmaStatus::Completed | RmaStatus::Cancelled) {
            return Err(AppError::invalid_state(
                "Cannot change status of a completed or cancelled RMA",
            ));
        }

        if rma.status == new_status {
            return Ok(rma);
        }

        let updated = rma_repo
            .change_status(id, new_status)
            .await?
            .ok_or_else(|| AppError::not_found("RMA not found"))?;

        self.audit_service
            .log_action(AuditLogParams {
                actor,
                action: AuditAction::RmaStatusChange,
                entity_type: Some("rma"),
                entity_id: Some(updated.id),
                entity_name: Some(&updated.rma_number),
                changes: Some(serde_json::json!({
                    "from": rma.status.as_str(),
                    "to": new_status.as_str(),
                })),
                metadata: None,
            })
            .await?;

        Ok(updated)
    }

    /// 完成 RMA
    ///
    /// 单事务执行：行锁定 RMA → 状态守卫 → 锁定并校验全部替换行库存
    /// （任一不足则整体中止，不发生任何调整）→ 退货行补库、替换行扣减
    /// → 置 completed 并打时间戳 → 审计写入 → 提交。
    #[instrument(skip(self, actor))]
    pub async fn complete_rma(&self, id: Uuid, actor: &Actor) -> Result<Rma> {
        let mut tx = self.db.begin().await?;

        let rma = sqlx::query_as::<_, Rma>("SELECT * FROM rmas WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("RMA not found"))?;

        match rma.status {
            RmaStatus::Completed => {
                return Err(AppError::invalid_state("RMA is already completed"))
            }
            RmaStatus::Cancelled => {
                return Err(AppError::invalid_state("Cannot complete a cancelled RMA"))
            }
            RmaStatus::Draft | RmaStatus::Approved => {}
        }

        // 先锁定并校验所有替换行库存，全部通过才允许任何调整
        for item in &rma.replacement_items.0 {
            let available =
                Self::lock_stock(&mut tx, item.product_id, item.variant_id, &item.sku).await?;

            if available < item.qty {
                return Err(AppError::InsufficientStock {
                    sku: item.sku.clone(),
                    available,
                    required: item.qty,
                });
            }
        }

        // 退货行补库
        for item in &rma.return_items.0 {
            let Some(product_id) = item.product_id else {
                continue; // 无法回溯到商品的历史行项，跳过补库
            };
            Self::adjust_stock_in_tx(&mut tx, product_id, item.qty, item.variant_id).await?;

            let entry = AuditService::build_entry(AuditLogParams {
                actor,
                action: AuditAction::InventoryRestockFromReturn,
                entity_type: Some("product"),
                entity_id: Some(product_id),
                entity_name: Some(&item.sku),
                changes: None,
                metadata: Some(serde_json::json!({
                    "rma_number": rma.rma_number,
                    "qty": item.qty,
                    "variant_id": item.variant_id,
                })),
            });
            AuditRepository::insert_in_tx(&mut tx, &entry).await?;
        }

        // 替换行扣减
        for item in &rma.replacement_items.0 {
            Self::adjust_stock_in_tx(&mut tx, item.product_id, -item.qty, item.variant_id).await?;

            let entry = AuditService::build_entry(AuditLogParams {
                actor,
                action: AuditAction::InventoryConsumeForExchange,
                entity_type: Some("product"),
                entity_id: Some(item.product_id),
                entity_name: Some(&item.sku),
                changes: None,
                metadata: Some(serde_json::json!({
                    "rma_number": rma.rma_number,
                    "qty": item.qty,
                    "variant_id": item.variant_id,
                })),
            });
            AuditRepository::insert_in_tx(&mut tx, &entry).await?;
        }

        let completed = sqlx::query_as::<_, Rma>(
            r#"
            UPDATE rmas
            SET status = 'completed', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let entry = AuditService::build_entry(AuditLogParams {
            actor,
            action: AuditAction::RmaComplete,
            entity_type: Some("rma"),
            entity_id: Some(completed.id),
            entity_name: Some(&completed.rma_number),
            changes: Some(serde_json::json!({
                "from": rma.status.as_str(),
                "to": "completed",
            })),
            metadata: None,
        });
        AuditRepository::insert_in_tx(&mut tx, &entry).await?;

        tx.commit().await?;

        info!(
            rma_id = %completed.id,
            rma_number = %completed.rma_number,
            settlement = ?completed.settlement,
            "RMA completed"
        );
        Ok(completed)
    }

    /// 取消 RMA
    ///
    /// 已完成的 RMA 取消时可按调用方选择回滚完成时的库存效果；
    /// 回滚不产生逐行审计，只在取消事件的元数据里标记。
    #[instrument(skip(self, actor))]
    pub async fn cancel_rma(&self, id: Uuid, revert_inventory: bool, actor: &Actor) -> Result<Rma> {
        let mut tx = self.db.begin().await?;

        let rma = sqlx::query_as::<_, Rma>("SELECT * FROM rmas WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("RMA not found"))?;

        if rma.status == RmaStatus::Cancelled {
            return Err(AppError::invalid_state("RMA is already cancelled"));
        }

        let reverted = rma.status == RmaStatus::Completed && revert_inventory;
        if reverted {
            // 完成时效果的逆操作：退货行扣回，替换行补回
            for item in &rma.return_items.0 {
                let Some(product_id) = item.product_id else {
                    continue;
                };
                Self::adjust_stock_in_tx(&mut tx, product_id, -item.qty, item.variant_id).await?;
            }
            for item in &rma.replacement_items.0 {
                Self::adjust_stock_in_tx(&mut tx, item.product_id, item.qty, item.variant_id)
                    .await?;
            }
        }

        let cancelled = sqlx::query_as::<_, Rma>(
            r#"
            UPDATE rmas
            SET status = 'cancelled', cancelled_at = NOW(), completed_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let entry = AuditService::build_entry(AuditLogParams {
            actor,
            action: AuditAction::RmaCancel,
            entity_type: Some("rma"),
            entity_id: Some(cancelled.id),
            entity_name: Some(&cancelled.rma_number),
            changes: Some(serde_json::json!({
                "from": rma.status.as_str(),
                "to": "cancelled",
            })),
            metadata: Some(serde_json::json!({ "reverted_inventory": reverted })),
        });
        AuditRepository::insert_in_tx(&mut tx, &entry).await?;

        tx.commit().await?;

        info!(
            rma_id = %cancelled.id,
            rma_number = %cancelled.rma_number,
            reverted_inventory = reverted,
            "RMA cancelled"
        );
        Ok(cancelled)
    }

    /// 获取 RMA 详情
    pub async fn get_rma(&self, id: Uuid) -> Result<Rma> {
        RmaRepository::new(self.db.clone())
            .find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found("RMA not found"))
    }

    /// 查询 RMA 列表
    pub async fn list_rmas(
        &self,
        filters: &RmaListFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Rma>> {
        RmaRepository::new(self.db.clone())
            .list(filters, limit, offset)
            .await
    }

    /// 订单各行项的可退余量报告（RMA 创建界面的依据）
    pub async fn returnable_report(&self, order_id: Uuid) -> Result<Vec<ReturnableItem>> {
        let order_repo = OrderRepository::new(self.db.clone());
        order_repo
            .find_by_id(&order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order not found"))?;

        let order_items = order_repo.find_items(&order_id).await?;
        let order_rmas = RmaRepository::new(self.db.clone())
            .list_by_order(&order_id)
            .await?;

        Ok(order_items
            .into_iter()
            .map(|item| {
                let max = max_returnable_qty(&item, &order_rmas, None);
                ReturnableItem {
                    order_item_id: item.id,
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    sku: item.sku,
                    name: item.name,
                    original_qty: item.qty,
                    max_returnable_qty: max,
                }
            })
            .collect())
    }

    /// 按订单行项冻结退货行快照，并校验可退余量
    fn build_return_items(
        requests: &[RmaItemRequest],
        order_items: &[OrderItem],
        order_rmas: &[Rma],
        exclude_rma_id: Option<Uuid>,
    ) -> Result<Vec<RmaItem>> {
        let mut items = Vec::with_capacity(requests.len());

        for request in requests {
            if request.qty <= 0 {
                return Err(AppError::validation("Return quantity must be positive"));
            }

            let order_item = order_items
                .iter()
                .find(|item| item.id == request.order_item_id)
                .ok_or_else(|| {
                    AppError::validation("Return item does not reference an item of this order")
                })?;

            let max = max_returnable_qty(order_item, order_rmas, exclude_rma_id);
            if request.qty > max {
                return Err(AppError::Validation(format!(
                    "Return quantity {} for {} exceeds the returnable remainder {}",
                    request.qty, order_item.sku, max
                )));
            }

            items.push(RmaItem {
                product_id: Some(order_item.product_id),
                variant_id: order_item.variant_id,
                sku: order_item.sku.clone(),
                name: order_item.name.clone(),
                options: order_item.options.clone(),
                qty: request.qty,
                unit_price_at_sale: order_item.unit_price_at_sale,
            });
        }

        Ok(items)
    }

    /// 解析替换行：商品/变体必须存在，单价非负
    async fn build_replacement_items(
        &self,
        requests: &[RmaReplacementItemRequest],
    ) -> Result<Vec<RmaReplacementItem>> {
        let product_repo = ProductRepository::new(self.db.clone());
        let mut items = Vec::with_capacity(requests.len());

        for request in requests {
            if request.qty <= 0 {
                return Err(AppError::validation(
                    "Replacement quantity must be positive",
                ));
            }
            if request.unit_price.is_sign_negative() {
                return Err(AppError::validation(
                    "Replacement unit price cannot be negative",
                ));
            }

            let product = product_repo
                .find_by_id(&request.product_id)
                .await?
                .ok_or_else(|| AppError::validation("Replacement item references an unknown product"))?;

            let name = match request.variant_id {
                Some(variant_id) => {
                    let variants = product_repo.find_variants(&product.id).await?;
                    let variant = variants
                        .iter()
                        .find(|v| v.id == variant_id)
                        .ok_or_else(|| {
                            AppError::validation(
                                "Replacement item references an unknown product variant",
                            )
                        })?;
                    format!("{} ({})", product.name, variant.name)
                }
                None => product.name.clone(),
            };

            items.push(RmaReplacementItem {
                product_id: product.id,
                variant_id: request.variant_id,
                sku: product.sku,
                name,
                qty: request.qty,
                unit_price: request.unit_price,
            });
        }

        Ok(items)
    }

    /// 事务内锁定库存行并返回当前可用量
    ///
    /// 无变体取商品级库存，有变体取对应变体库存。
    async fn lock_stock(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        sku: &str,
    ) -> Result<i32> {
        let stock: Option<i32> = match variant_id {
            Some(variant_id) => {
                sqlx::query_scalar(
                    "SELECT stock FROM product_variants WHERE id = $1 AND product_id = $2 FOR UPDATE",
                )
                .bind(variant_id)
                .bind(product_id)
                .fetch_optional(&mut **tx)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
                    .bind(product_id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
        };

        stock.ok_or_else(|| AppError::NotFound(format!("Product {} no longer exists", sku)))
    }

    /// 事务内调整库存（正数补货，负数扣减）
    async fn adjust_stock_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
        delta: i32,
        variant_id: Option<Uuid>,
    ) -> Result<()> {
        match variant_id {
            Some(variant_id) => {
                sqlx::query(
                    "UPDATE product_variants SET stock = stock + $3 WHERE id = $2 AND product_id = $1",
                )
                .bind(product_id)
                .bind(variant_id)
                .bind(delta)
                .execute(&mut **tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(product_id)
                .bind(delta)
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }
}
