pub mod bill_of_material;
pub mod bom_item;
pub mod bom_version;
pub mod catalog_item;

pub mod prelude {
    pub use super::bill_of_material::Entity as BillOfMaterial;
    pub use super::bom_item::Entity as BomItem;
    pub use super::bom_version::Entity as BomVersion;
    pub use super::catalog_item::Entity as CatalogItem;
}
