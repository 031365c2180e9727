//! 板材與棒材預留示例

use std::sync::Arc;

use matflow::model::{
    CustomSpec, MaterialType, Pricing, Profile, Quantity, ResourceKey, ResourceSelector,
    ResourceStock,
};
use matflow::store::{InMemoryCatalog, InMemoryDemand, InMemoryOrders};
use matflow::{AccountingConfig, AccountingCore, Collaborators};
use rust_decimal::Decimal;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    matflow::telemetry::init_tracing("info");
    println!("=== 板材預留示例 ===\n");

    // 建立目錄：S235 鋼材，Plate-A 20 片，Rod-20 12 公尺
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_material_type(MaterialType::new(
        "S235",
        "Baustahl S235",
        Decimal::new(785, 2),
        Decimal::new(180, 2),
    ));
    catalog.upsert_resource(
        ResourceStock::new(
            ResourceKey::material("PLATE-A"),
            "Plate-A 1000x500x5",
            Profile::Flat {
                x: Decimal::from(1000),
                y: Decimal::from(500),
                z: Decimal::from(5),
            },
            Decimal::from(20),
            Pricing::PerKg(Decimal::new(180, 2)),
        )
        .with_material_type("S235"),
    );
    catalog.upsert_resource(
        ResourceStock::new(
            ResourceKey::material("ROD-20"),
            "Rundstahl Ø20",
            Profile::Rod {
                diameter: Decimal::from(20),
            },
            Decimal::from(12),
            Pricing::PerKg(Decimal::new(210, 2)),
        )
        .with_material_type("S235"),
    );

    let core = AccountingCore::new(
        AccountingConfig::default(),
        Collaborators::new(
            catalog,
            Arc::new(InMemoryDemand::new()),
            Arc::new(InMemoryOrders::new()),
        ),
    )?;
    let reservations = core.reservations();

    let plate = reservations.reserve(
        "WI-100",
        ResourceSelector::catalog(ResourceKey::material("PLATE-A")),
        Quantity::Pieces(15),
    )?;
    println!(
        "WI-100 預留 {}：{} kg，成本 {}",
        plate.quantity, plate.weight_kg, plate.cost
    );

    let rod = reservations.reserve(
        "WI-100",
        ResourceSelector::catalog(ResourceKey::material("ROD-20")),
        Quantity::Length(Decimal::new(35, 1)),
    )?;
    println!("WI-100 預留 {}：{} kg，成本 {}", rod.quantity, rod.weight_kg, rod.cost);

    // 第二個工單要 15 片，只剩 5 片
    match reservations.reserve(
        "WI-200",
        ResourceSelector::catalog(ResourceKey::material("PLATE-A")),
        Quantity::Pieces(15),
    ) {
        Ok(_) => println!("WI-200 預留成功（不應發生）"),
        Err(e) => println!("WI-200 被拒絕 [{}]：{}", e.status_code(), e),
    }

    // 自訂規格管材不檢查庫存
    let tube = reservations.reserve(
        "WI-200",
        ResourceSelector::custom(CustomSpec::new(
            "Sonderrohr 40x5",
            Profile::Tube {
                outer_diameter: Decimal::from(40),
                inner_diameter: Decimal::from(30),
            },
            "S235",
        )),
        Quantity::Length(Decimal::from(2)),
    )?;
    println!("WI-200 自訂管材 {}：{} kg，成本 {}", tube.quantity, tube.weight_kg, tube.cost);

    reservations.cancel(plate.id)?;
    let availability = reservations.availability(&ResourceKey::material("PLATE-A"))?;
    println!(
        "\n取消後 {} 可用 {} / 庫存 {}",
        availability.name, availability.available_quantity, availability.current_stock
    );

    Ok(())
}
