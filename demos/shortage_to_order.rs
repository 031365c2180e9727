//! 短缺分析 → 採購建議 → 採購單 → 三方對帳示例

use std::sync::Arc;

use chrono::{Days, Utc};
use matflow::model::{
    DeliveryLine, InvoiceLine, OpenDemand, PoLine, Pricing, Profile, ResourceKey, ResourceStock,
};
use matflow::store::{InMemoryCatalog, InMemoryDemand, InMemoryOrders, OrderDocuments};
use matflow::{AccountingConfig, AccountingCore, Collaborators};
use rust_decimal::Decimal;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    matflow::telemetry::init_tracing("info");
    println!("=== 短缺到採購單示例 ===\n");

    let config = AccountingConfig::from_json(
        r#"{
            "shortage": { "critical_window_days": 5 },
            "default_vat_rate": "0.19"
        }"#,
    )?;

    let catalog = Arc::new(InMemoryCatalog::new());
    let demand = Arc::new(InMemoryDemand::new());
    let orders = Arc::new(InMemoryOrders::new());
    catalog.set_lead_time("SUP-FASTEN", 3);

    let today = Utc::now().date_naive();
    for (id, name, stock, min, price, need, days) in [
        ("BOLT-M8", "Schraube M8x40", 40, 50, "0.12", 200, 4),
        ("NUT-M8", "Mutter M8", 120, 50, "0.05", 150, 12),
        ("WASHER-8", "Scheibe 8.4", 500, 100, "0.02", 0, 0),
    ] {
        let key = ResourceKey::accessory(id);
        catalog.upsert_resource(
            ResourceStock::new(
                key.clone(),
                name,
                Profile::Discrete,
                Decimal::from(stock),
                Pricing::PerUnit(price.parse()?),
            )
            .with_min_quantity(Decimal::from(min))
            .with_preferred_supplier("SUP-FASTEN")
            .with_packaging_unit(Decimal::from(100)),
        );
        if need > 0 {
            demand.add_demand(
                key,
                OpenDemand::new("WI-300", Decimal::from(need), today.checked_add_days(Days::new(days))),
            );
        }
    }

    let core = AccountingCore::new(config, Collaborators::new(catalog, demand, orders.clone()))?;

    // 1. 短缺分析與分組
    let (report, outcome) = core.analyze_and_group()?;
    println!("短缺分析（{} 筆）:", report.analyses.len());
    for analysis in &report.analyses {
        println!(
            "  - [{}] {}: 可用 {}，短缺 {}，建議訂購 {}",
            analysis.priority,
            analysis.resource_name,
            analysis.available_quantity,
            analysis.shortage_quantity,
            analysis.suggested_order_quantity
        );
    }
    println!("\n儀表板: {}", serde_json::to_string_pretty(&core.shortages().dashboard())?);

    // 2. 轉為採購單
    for group in &outcome.groups {
        println!(
            "\n採購建議 {}：{} 項，未稅 {}，含稅 {}，建議下單日 {}",
            group.supplier_id,
            group.item_count,
            group.estimated_net,
            group.estimated_gross,
            group.suggested_order_date
        );
        let order = core
            .suggestions()
            .materialize(group.id, &group.supplier_id, "Fasteners restock", None)?;
        println!("已建立採購單 {order}");

        // 3. 模擬到貨與發票（螺栓發票單價調漲）
        let (_, request) = orders
            .created_orders()
            .into_iter()
            .find(|(created, _)| *created == order)
            .ok_or("找不到剛建立的採購單")?;
        let mut documents = OrderDocuments::default();
        for (index, line) in request.lines.iter().enumerate() {
            let line_ref = format!("L{}", index + 1);
            documents.order_lines.push(
                PoLine::new(&line_ref, &line.name, line.quantity, line.unit_price)
                    .with_vat_rate(line.vat_rate),
            );
            documents
                .delivery_lines
                .push(DeliveryLine::new(&line_ref, line.quantity, line.unit_price));
            let invoiced_price = if line.resource.id == "BOLT-M8" {
                line.unit_price + Decimal::new(1, 2)
            } else {
                line.unit_price
            };
            documents
                .invoice_lines
                .push(InvoiceLine::new(&line_ref, line.quantity, invoiced_price));
        }
        orders.set_documents(order.as_str(), documents);

        let record = core.reconciliation().reconcile(order.as_str())?;
        println!("\n對帳狀態: {}", record.status);
        for d in &record.discrepancies {
            println!(
                "  - {} {}: 差額 {}（{:?} / {:?}）",
                d.line_ref, d.item_name, d.amount_difference, d.discrepancy_type, d.severity
            );
        }
        if !record.is_matched() {
            let approved = core.reconciliation().approve(
                record.id,
                "purchasing-lead",
                Some("supplier price list 2025-11".to_string()),
            )?;
            println!("核准後狀態: {}", approved.status);
        }
    }

    Ok(())
}
