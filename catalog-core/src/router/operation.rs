//! Static classification of catalog operations
//!
//! Every operation identifier maps to exactly one area store and is either a read or
//! a write. The table below is the single source of truth; lookup by name is a hash
//! map built on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::store::Area;

/// Whether an operation mutates its store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

macro_rules! operations {
    ($( $(#[$doc:meta])* $variant:ident => $name:literal, $area:ident, $access:ident; )+) => {
        /// A catalog operation the router can dispatch
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Operation {
            $( $(#[$doc])* $variant, )+
        }

        impl Operation {
            /// Every operation, in table order
            pub const ALL: &'static [Operation] = &[ $( Operation::$variant, )+ ];

            /// Wire identifier of the operation
            pub fn name(&self) -> &'static str {
                match self {
                    $( Operation::$variant => $name, )+
                }
            }

            /// Store the operation runs against
            pub fn area(&self) -> Area {
                match self {
                    $( Operation::$variant => Area::$area, )+
                }
            }

            pub fn access(&self) -> Access {
                match self {
                    $( Operation::$variant => Access::$access, )+
                }
            }
        }
    };
}

operations! {
    // Normati
    FetchCategories => "fetch_categories", Normati, Read;
    FetchStandards => "fetch_standards", Normati, Read;
    FetchSubcategories => "fetch_subcategories", Normati, Read;
    GetNextSeq => "get_next_seq", Normati, Read;
    SearchItems => "search_items", Normati, Read;
    ReadItem => "read_item", Normati, Read;
    CreateCategory => "create_category", Normati, Write;
    UpdateCategory => "update_category", Normati, Write;
    DeleteCategory => "delete_category", Normati, Write;
    CreateStandard => "create_standard", Normati, Write;
    UpdateStandard => "update_standard", Normati, Write;
    DeleteStandard => "delete_standard", Normati, Write;
    CreateSubcategory => "create_subcategory", Normati, Write;
    UpdateSubcategory => "update_subcategory", Normati, Write;
    DeleteSubcategory => "delete_subcategory", Normati, Write;
    CreateItem => "create_item", Normati, Write;
    UpdateItem => "update_item", Normati, Write;
    DeleteItem => "delete_item", Normati, Write;

    // Commerciali
    FetchCommCategories => "fetch_comm_categories", Commerciali, Read;
    FetchCommSubcategories => "fetch_comm_subcategories", Commerciali, Read;
    FetchSuppliers => "fetch_suppliers", Commerciali, Read;
    GetNextCommSeq => "get_next_comm_seq", Commerciali, Read;
    SearchCommItems => "search_comm_items", Commerciali, Read;
    ReadCommItem => "read_comm_item", Commerciali, Read;
    CreateCommCategory => "create_comm_category", Commerciali, Write;
    UpdateCommCategory => "update_comm_category", Commerciali, Write;
    DeleteCommCategory => "delete_comm_category", Commerciali, Write;
    CreateCommSubcategory => "create_comm_subcategory", Commerciali, Write;
    UpdateCommSubcategory => "update_comm_subcategory", Commerciali, Write;
    DeleteCommSubcategory => "delete_comm_subcategory", Commerciali, Write;
    CreateSupplier => "create_supplier", Commerciali, Write;
    UpdateSupplier => "update_supplier", Commerciali, Write;
    DeleteSupplier => "delete_supplier", Commerciali, Write;
    CreateCommItem => "create_comm_item", Commerciali, Write;
    UpdateCommItem => "update_comm_item", Commerciali, Write;
    DeleteCommItem => "delete_comm_item", Commerciali, Write;

    // Materiali, semi-finished items, treatments
    FetchMaterialFamilies => "fetch_material_families", Materiali, Read;
    FetchMaterialSubfamilies => "fetch_material_subfamilies", Materiali, Read;
    CreateMaterialFamily => "create_material_family", Materiali, Write;
    UpdateMaterialFamily => "update_material_family", Materiali, Write;
    DeleteMaterialFamily => "delete_material_family", Materiali, Write;
    CreateMaterialSubfamily => "create_material_subfamily", Materiali, Write;
    UpdateMaterialSubfamily => "update_material_subfamily", Materiali, Write;
    DeleteMaterialSubfamily => "delete_material_subfamily", Materiali, Write;
    EnsureDefaultMaterialProperties => "ensure_default_material_properties", Materiali, Write;
    EnsureDefaultMaterialPropertiesAll => "ensure_default_material_properties_all", Materiali, Write;
    EnsureMaterialTaxonomyEntry => "ensure_material_taxonomy_entry", Materiali, Write;
    SearchMaterials => "search_materials", Materiali, Read;
    ReadMaterial => "read_material", Materiali, Read;
    CreateMaterial => "create_material", Materiali, Write;
    UpdateMaterial => "update_material", Materiali, Write;
    DeleteMaterial => "delete_material", Materiali, Write;
    FetchMaterialProperties => "fetch_material_properties", Materiali, Read;
    ReadMaterialPropertyNotes => "read_material_property_notes", Materiali, Read;
    CreateMaterialProperty => "create_material_property", Materiali, Write;
    UpdateMaterialProperty => "update_material_property", Materiali, Write;
    DeleteMaterialProperty => "delete_material_property", Materiali, Write;
    FetchHeatTreatments => "fetch_heat_treatments", Materiali, Read;
    FetchSurfaceTreatments => "fetch_surface_treatments", Materiali, Read;
    ReadHeatTreatment => "read_heat_treatment", Materiali, Read;
    ReadSurfaceTreatment => "read_surface_treatment", Materiali, Read;
    CreateHeatTreatment => "create_heat_treatment", Materiali, Write;
    UpdateHeatTreatment => "update_heat_treatment", Materiali, Write;
    DeleteHeatTreatment => "delete_heat_treatment", Materiali, Write;
    CreateSurfaceTreatment => "create_surface_treatment", Materiali, Write;
    UpdateSurfaceTreatment => "update_surface_treatment", Materiali, Write;
    DeleteSurfaceTreatment => "delete_surface_treatment", Materiali, Write;
    FetchSemiTypes => "fetch_semi_types", Materiali, Read;
    FetchSemiStates => "fetch_semi_states", Materiali, Read;
    CreateSemiType => "create_semi_type", Materiali, Write;
    UpdateSemiType => "update_semi_type", Materiali, Write;
    DeleteSemiType => "delete_semi_type", Materiali, Write;
    CreateSemiState => "create_semi_state", Materiali, Write;
    UpdateSemiState => "update_semi_state", Materiali, Write;
    DeleteSemiState => "delete_semi_state", Materiali, Write;
    SearchSemiItems => "search_semi_items", Materiali, Read;
    FetchSemisByMaterial => "fetch_semis_by_material", Materiali, Read;
    ReadSemiItem => "read_semi_item", Materiali, Read;
    CreateSemiItem => "create_semi_item", Materiali, Write;
    UpdateSemiItem => "update_semi_item", Materiali, Write;
    DeleteSemiItem => "delete_semi_item", Materiali, Write;
    FetchSemiDimensions => "fetch_semi_dimensions", Materiali, Read;
    CreateSemiDimension => "create_semi_dimension", Materiali, Write;
    UpdateSemiDimension => "update_semi_dimension", Materiali, Write;
    DeleteSemiDimension => "delete_semi_dimension", Materiali, Write;
    CloneSemiDimensions => "clone_semi_dimensions", Materiali, Write;
    ReadMaterialDensityGCm3 => "read_material_density_g_cm3", Materiali, Read;
    CalculateSemiWeightPerM => "calculate_semi_weight_per_m", Materiali, Read;

    // Manual, hosted on the normati store
    FetchManualVersions => "fetch_manual_versions", Normati, Read;
    ReadManualVersion => "read_manual_version", Normati, Read;
    CreateManualVersion => "create_manual_version", Normati, Write;
    UpdateManualVersion => "update_manual_version", Normati, Write;
    DeleteManualVersion => "delete_manual_version", Normati, Write;
}

impl Operation {
    pub fn is_write(&self) -> bool {
        self.access() == Access::Write
    }

    /// Look an operation up by identifier
    pub fn from_name(name: &str) -> Option<Operation> {
        static BY_NAME: OnceLock<HashMap<&'static str, Operation>> = OnceLock::new();
        BY_NAME
            .get_or_init(|| Operation::ALL.iter().map(|op| (op.name(), *op)).collect())
            .get(name)
            .copied()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
