//! 外部協作介面的記憶體實作（開發、示範與測試使用）

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use matflow_core::{
    AccountingError, DeliveryLine, DemandSource, DomainEvent, EntityKind, EventSink, InvoiceLine,
    MaterialType, OpenDemand, OrderGateway, OrderRef, PoLine, PurchaseOrderRequest,
    ResourceCatalog, ResourceKey, ResourceStock, Result,
};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

/// 記憶體資源目錄
#[derive(Default)]
pub struct InMemoryCatalog {
    resources: RwLock<BTreeMap<ResourceKey, ResourceStock>>,
    material_types: RwLock<HashMap<String, MaterialType>>,
    lead_times: RwLock<HashMap<String, u32>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增或取代資源
    pub fn upsert_resource(&self, stock: ResourceStock) {
        self.resources.write().insert(stock.key.clone(), stock);
    }

    /// 調整現有庫存（例如入庫或盤點）
    pub fn set_stock(&self, key: &ResourceKey, stock: Decimal) -> Result<()> {
        let mut resources = self.resources.write();
        let resource = resources
            .get_mut(key)
            .ok_or_else(|| AccountingError::not_found(EntityKind::Resource, key))?;
        resource.stock = stock;
        Ok(())
    }

    /// 設置在途數量（未到貨的採購單明細）
    pub fn set_in_transit(&self, key: &ResourceKey, quantity: Decimal) -> Result<()> {
        let mut resources = self.resources.write();
        let resource = resources
            .get_mut(key)
            .ok_or_else(|| AccountingError::not_found(EntityKind::Resource, key))?;
        resource.in_transit_quantity = quantity;
        Ok(())
    }

    /// 移除資源（停止追蹤）
    pub fn remove_resource(&self, key: &ResourceKey) -> Option<ResourceStock> {
        self.resources.write().remove(key)
    }

    pub fn add_material_type(&self, material_type: MaterialType) {
        self.material_types
            .write()
            .insert(material_type.id.clone(), material_type);
    }

    pub fn set_lead_time(&self, supplier_id: impl Into<String>, days: u32) {
        self.lead_times.write().insert(supplier_id.into(), days);
    }
}

impl ResourceCatalog for InMemoryCatalog {
    fn resource_keys(&self) -> Result<Vec<ResourceKey>> {
        Ok(self.resources.read().keys().cloned().collect())
    }

    fn resource_stock(&self, key: &ResourceKey) -> Result<ResourceStock> {
        self.resources
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| AccountingError::not_found(EntityKind::Resource, key))
    }

    fn material_type(&self, material_type_id: &str) -> Result<MaterialType> {
        self.material_types
            .read()
            .get(material_type_id)
            .cloned()
            .ok_or_else(|| AccountingError::not_found(EntityKind::MaterialType, material_type_id))
    }

    fn supplier_lead_time_days(&self, supplier_id: &str) -> Result<u32> {
        self.lead_times
            .read()
            .get(supplier_id)
            .copied()
            .ok_or_else(|| AccountingError::not_found(EntityKind::Supplier, supplier_id))
    }
}

/// 記憶體需求來源
#[derive(Default)]
pub struct InMemoryDemand {
    demand: RwLock<HashMap<ResourceKey, Vec<OpenDemand>>>,
}

impl InMemoryDemand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_demand(&self, key: ResourceKey, demand: OpenDemand) {
        self.demand.write().entry(key).or_default().push(demand);
    }

    /// 清除資源的需求（例如已被預留覆蓋）
    pub fn clear(&self, key: &ResourceKey) {
        self.demand.write().remove(key);
    }
}

impl DemandSource for InMemoryDemand {
    fn open_demand(&self, key: &ResourceKey) -> Result<Vec<OpenDemand>> {
        Ok(self.demand.read().get(key).cloned().unwrap_or_default())
    }
}

/// 單一訂單的三方明細
#[derive(Debug, Clone, Default)]
pub struct OrderDocuments {
    pub order_lines: Vec<PoLine>,
    pub delivery_lines: Vec<DeliveryLine>,
    pub invoice_lines: Vec<InvoiceLine>,
}

/// 記憶體訂單元件
#[derive(Default)]
pub struct InMemoryOrders {
    created: Mutex<Vec<(OrderRef, PurchaseOrderRequest)>>,
    documents: RwLock<HashMap<String, OrderDocuments>>,
    next_number: AtomicU64,
    fail_next_create: AtomicBool,
}

impl InMemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次建立採購單時回傳上游錯誤
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    /// 已建立的採購單
    pub fn created_orders(&self) -> Vec<(OrderRef, PurchaseOrderRequest)> {
        self.created.lock().clone()
    }

    /// 設置訂單的三方明細
    pub fn set_documents(&self, order_id: impl Into<String>, documents: OrderDocuments) {
        self.documents.write().insert(order_id.into(), documents);
    }

    fn documents(&self, order_id: &str) -> Result<OrderDocuments> {
        self.documents
            .read()
            .get(order_id)
            .cloned()
            .ok_or_else(|| AccountingError::not_found(EntityKind::Order, order_id))
    }
}

impl OrderGateway for InMemoryOrders {
    fn create_purchase_order(&self, request: &PurchaseOrderRequest) -> Result<OrderRef> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(AccountingError::upstream("orders", "採購單服務暫時無法使用"));
        }
        if request.lines.is_empty() {
            return Err(AccountingError::validation("採購單至少需要一行明細"));
        }

        let number = self.next_number.fetch_add(1, Ordering::SeqCst) + 1;
        let order = OrderRef::new(format!("PO-{number:05}"));
        self.created.lock().push((order.clone(), request.clone()));
        Ok(order)
    }

    fn order_lines(&self, order_id: &str) -> Result<Vec<PoLine>> {
        Ok(self.documents(order_id)?.order_lines)
    }

    fn delivery_lines(&self, order_id: &str) -> Result<Vec<DeliveryLine>> {
        Ok(self.documents(order_id)?.delivery_lines)
    }

    fn invoice_lines(&self, order_id: &str) -> Result<Vec<InvoiceLine>> {
        Ok(self.documents(order_id)?.invoice_lines)
    }
}

/// 記錄所有事件
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    /// 事件名稱（依發生順序）
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name()).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matflow_core::{ErrorKind, Pricing, Profile, PurchaseOrderLine, StockUnit};

    #[test]
    fn test_catalog_lookup() {
        let catalog = InMemoryCatalog::new();
        let key = ResourceKey::tool("DRILL-8");
        catalog.upsert_resource(ResourceStock::new(
            key.clone(),
            "Drill 8mm",
            Profile::Discrete,
            Decimal::from(3),
            Pricing::PerUnit(Decimal::from(12)),
        ));
        catalog.set_stock(&key, Decimal::from(5)).unwrap();

        catalog.set_in_transit(&key, Decimal::from(7)).unwrap();

        let stock = catalog.resource_stock(&key).unwrap();
        assert_eq!(stock.stock, Decimal::from(5));
        assert_eq!(stock.in_transit_quantity, Decimal::from(7));
        assert_eq!(catalog.resource_keys().unwrap(), vec![key.clone()]);
        assert_eq!(
            catalog.supplier_lead_time_days("SUP-X").unwrap_err().kind(),
            ErrorKind::NotFound
        );

        assert!(catalog.remove_resource(&key).is_some());
        assert!(catalog.resource_keys().unwrap().is_empty());
        assert_eq!(
            catalog.set_in_transit(&key, Decimal::ONE).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_orders_fail_once() {
        let orders = InMemoryOrders::new();
        let request = PurchaseOrderRequest {
            supplier_id: "SUP-1".to_string(),
            name: "Restock".to_string(),
            notes: None,
            lines: vec![PurchaseOrderLine {
                resource: ResourceKey::tool("DRILL-8"),
                name: "Drill 8mm".to_string(),
                quantity: Decimal::from(10),
                unit: StockUnit::Pieces,
                unit_price: Decimal::from(12),
                vat_rate: Decimal::ZERO,
            }],
        };

        orders.fail_next_create();
        assert_eq!(
            orders.create_purchase_order(&request).unwrap_err().kind(),
            ErrorKind::Upstream
        );
        assert!(orders.created_orders().is_empty());

        let order = orders.create_purchase_order(&request).unwrap();
        assert_eq!(order.as_str(), "PO-00001");
        assert_eq!(orders.created_orders().len(), 1);
    }
}
