//! 預留管理
//!
//! 同一資源的「可用量檢查 + 寫入」在資源鎖內完成，避免並行預留超額佔用庫存。
//! 取消、耗用與更新之間以列版本互斥。

use std::sync::Arc;

use matflow_core::{
    AccountingError, Clock, CustomSpec, DomainEvent, EventSink, Pricing, Profile, Quantity,
    Reservation, ResourceCatalog, ResourceKey, ResourceSelector, ResourceStock, Result, StockUnit,
};
use matflow_store::{KeyedLocks, Store};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// 資源可用量摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Availability {
    pub resource: ResourceKey,
    pub name: String,
    pub unit: StockUnit,
    pub current_stock: Decimal,
    /// RESERVED 總量
    pub reserved_quantity: Decimal,
    /// 現有庫存 − RESERVED 總量
    pub available_quantity: Decimal,
    /// 仍在 RESERVED 的預留
    pub reservations: Vec<Reservation>,
}

/// 重量與成本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Valuation {
    weight_kg: Decimal,
    cost: Decimal,
}

/// 預留管理器
pub struct ReservationManager {
    catalog: Arc<dyn ResourceCatalog>,
    store: Arc<Store>,
    locks: KeyedLocks<ResourceKey>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl ReservationManager {
    /// 創建新的預留管理器
    pub fn new(
        catalog: Arc<dyn ResourceCatalog>,
        store: Arc<Store>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            store,
            locks: KeyedLocks::new(),
            events,
            clock,
        }
    }

    /// 為生產工作項目建立預留
    pub fn reserve(
        &self,
        work_item_id: &str,
        selector: ResourceSelector,
        quantity: Quantity,
    ) -> Result<Reservation> {
        if work_item_id.trim().is_empty() {
            return Err(AccountingError::validation("預留必須指定生產工作項目"));
        }

        let reservation = match &selector {
            ResourceSelector::Catalog { key } => {
                let lock = self.locks.handle(key);
                let _guard = lock.lock();

                let stock = self.catalog.resource_stock(key)?;
                quantity.validate_for(&stock.profile)?;
                let valuation = self.value_catalog(&stock, &quantity)?;
                let reserved = self.store.reservations.reserved_sum(key, None);
                Self::ensure_available(&stock, reserved, &quantity)?;

                let reservation = Reservation::new(
                    work_item_id,
                    selector.clone(),
                    quantity,
                    valuation.weight_kg,
                    valuation.cost,
                    self.clock.now(),
                );
                self.store.reservations.insert(reservation.clone())?;
                reservation
            }
            ResourceSelector::Custom { spec } => {
                let valuation = self.value_custom(spec, &quantity)?;
                let reservation = Reservation::new(
                    work_item_id,
                    selector.clone(),
                    quantity,
                    valuation.weight_kg,
                    valuation.cost,
                    self.clock.now(),
                );
                self.store.reservations.insert(reservation.clone())?;
                reservation
            }
        };

        tracing::info!(
            reservation_id = %reservation.id,
            work_item_id,
            quantity = %reservation.quantity,
            weight_kg = %reservation.weight_kg,
            cost = %reservation.cost,
            "建立預留"
        );
        self.events.publish(DomainEvent::ReservationCreated {
            reservation_id: reservation.id,
            work_item_id: reservation.work_item_id.clone(),
            resource: reservation.selector.catalog_key().cloned(),
            quantity: reservation.quantity.amount(),
            unit: reservation.quantity.unit(),
        });

        Ok(reservation)
    }

    /// 更新預留數量（可用量不計入自身原有佔用）
    pub fn update_reservation(&self, reservation_id: Uuid, quantity: Quantity) -> Result<Reservation> {
        let selector = self.store.reservations.get(&reservation_id)?.record.selector;

        let updated = match &selector {
            ResourceSelector::Catalog { key } => {
                let lock = self.locks.handle(key);
                let _guard = lock.lock();

                let current = self.store.reservations.get(&reservation_id)?;
                let stock = self.catalog.resource_stock(key)?;
                quantity.validate_for(&stock.profile)?;
                let valuation = self.value_catalog(&stock, &quantity)?;

                let mut updated = current.record.clone();
                updated.revise(quantity, valuation.weight_kg, valuation.cost, self.clock.now())?;

                let reserved_by_others = self.store.reservations.reserved_sum(key, Some(reservation_id));
                Self::ensure_available(&stock, reserved_by_others, &quantity)?;

                self.store
                    .reservations
                    .compare_and_swap(&reservation_id, current.version, updated.clone())?;
                updated
            }
            ResourceSelector::Custom { spec } => {
                let current = self.store.reservations.get(&reservation_id)?;
                let valuation = self.value_custom(spec, &quantity)?;

                let mut updated = current.record.clone();
                updated.revise(quantity, valuation.weight_kg, valuation.cost, self.clock.now())?;
                self.store
                    .reservations
                    .compare_and_swap(&reservation_id, current.version, updated.clone())?;
                updated
            }
        };

        tracing::info!(reservation_id = %reservation_id, quantity = %updated.quantity, "更新預留");
        self.events.publish(DomainEvent::ReservationUpdated {
            reservation_id,
            quantity: updated.quantity.amount(),
        });

        Ok(updated)
    }

    /// 取消預留
    pub fn cancel(&self, reservation_id: Uuid) -> Result<Reservation> {
        let current = self.store.reservations.get(&reservation_id)?;
        let mut cancelled = current.record;
        cancelled.cancel(self.clock.now())?;
        self.store
            .reservations
            .compare_and_swap(&reservation_id, current.version, cancelled.clone())?;

        tracing::info!(reservation_id = %reservation_id, "取消預留");
        self.events
            .publish(DomainEvent::ReservationCancelled { reservation_id });
        Ok(cancelled)
    }

    /// 耗用預留（終態）
    pub fn consume(&self, reservation_id: Uuid) -> Result<Reservation> {
        let current = self.store.reservations.get(&reservation_id)?;
        let mut consumed = current.record;
        consumed.consume(self.clock.now())?;
        self.store
            .reservations
            .compare_and_swap(&reservation_id, current.version, consumed.clone())?;

        tracing::info!(reservation_id = %reservation_id, "耗用預留");
        self.events
            .publish(DomainEvent::ReservationConsumed { reservation_id });
        Ok(consumed)
    }

    /// 查詢資源可用量
    pub fn availability(&self, key: &ResourceKey) -> Result<Availability> {
        let stock = self.catalog.resource_stock(key)?;
        let reservations: Vec<_> = self
            .store
            .reservations
            .for_resource(key)
            .into_iter()
            .filter(|r| r.is_active())
            .collect();
        let reserved_quantity: Decimal = reservations.iter().map(|r| r.held_quantity()).sum();

        Ok(Availability {
            resource: key.clone(),
            name: stock.name.clone(),
            unit: stock.unit(),
            current_stock: stock.stock,
            reserved_quantity,
            available_quantity: stock.stock - reserved_quantity,
            reservations,
        })
    }

    /// 讀取單筆預留
    pub fn get(&self, reservation_id: Uuid) -> Result<Reservation> {
        self.store.reservations.get(&reservation_id).map(|v| v.record)
    }

    /// 工作項目的所有預留
    pub fn for_work_item(&self, work_item_id: &str) -> Vec<Reservation> {
        self.store.reservations.for_work_item(work_item_id)
    }

    fn ensure_available(stock: &ResourceStock, reserved: Decimal, quantity: &Quantity) -> Result<()> {
        let available = stock.stock - reserved;
        let required = quantity.amount();
        if required > available {
            tracing::warn!(
                resource = %stock.key,
                %required,
                %available,
                "庫存不足，拒絕預留"
            );
            return Err(AccountingError::InsufficientResource {
                resource: stock.key.clone(),
                name: stock.name.clone(),
                required,
                available: available.max(Decimal::ZERO),
                unit: stock.unit(),
            });
        }
        Ok(())
    }

    /// 目錄資源：密度取自材質，價格取自目錄
    fn value_catalog(&self, stock: &ResourceStock, quantity: &Quantity) -> Result<Valuation> {
        let density = match &stock.material_type_id {
            Some(id) => Some(self.catalog.material_type_density(id)?),
            None => None,
        };
        Self::valuate(&stock.profile, quantity, density, stock.pricing)
    }

    /// 自訂規格：密度與每公斤單價取自材質
    fn value_custom(&self, spec: &CustomSpec, quantity: &Quantity) -> Result<Valuation> {
        spec.validate()?;
        quantity.validate_for(&spec.profile)?;
        let material_type = self.catalog.material_type(&spec.material_type_id)?;
        Self::valuate(
            &spec.profile,
            quantity,
            Some(material_type.density),
            Pricing::PerKg(material_type.price_per_kg),
        )
    }

    fn valuate(
        profile: &Profile,
        quantity: &Quantity,
        density: Option<Decimal>,
        pricing: Pricing,
    ) -> Result<Valuation> {
        let weight_kg = density
            .map(|d| profile.weight_kg(quantity, d))
            .unwrap_or(Decimal::ZERO);

        let cost = match pricing {
            Pricing::PerUnit(unit_price) => quantity.amount() * unit_price,
            Pricing::PerKg(price_per_kg) => {
                if density.is_none() {
                    return Err(AccountingError::validation("按重量計價的資源缺少材質密度"));
                }
                weight_kg * price_per_kg
            }
        };

        Ok(Valuation {
            weight_kg,
            cost: cost.round_dp(2),
        })
    }
}
