// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! City object types and the storage kinds they map onto
//!
//! [`CityObjectType`] is closed: every CityJSON 1.0/1.1 type has a variant,
//! extension types (`+Name`) get their own variant and anything else fails to
//! parse. [`CityObjectType::store_kind`] is an exhaustive match, so adding a
//! variant without deciding its storage is a compile error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::GeometryType;

/// Every city object type of CityJSON 1.0 and 1.1
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CityObjectType {
    Bridge,
    BridgePart,
    BridgeInstallation,
    BridgeConstructionElement,
    BridgeConstructiveElement,
    BridgeRoom,
    BridgeFurniture,
    Building,
    BuildingPart,
    BuildingInstallation,
    BuildingConstructiveElement,
    BuildingFurniture,
    BuildingStorey,
    BuildingRoom,
    BuildingUnit,
    CityFurniture,
    CityObjectGroup,
    GenericCityObject,
    LandUse,
    OtherConstruction,
    PlantCover,
    SolitaryVegetationObject,
    TINRelief,
    WaterBody,
    Road,
    Railway,
    Waterway,
    TransportSquare,
    Tunnel,
    TunnelPart,
    TunnelInstallation,
    TunnelConstructiveElement,
    TunnelHollowSpace,
    TunnelFurniture,
    /// Extension type, stored with its leading `+`
    Extension(String),
}

/// Standard (non-extension) types, used by the exhaustiveness tests
pub const STANDARD_TYPES: [&str; 34] = [
    "Bridge",
    "BridgePart",
    "BridgeInstallation",
    "BridgeConstructionElement",
    "BridgeConstructiveElement",
    "BridgeRoom",
    "BridgeFurniture",
    "Building",
    "BuildingPart",
    "BuildingInstallation",
    "BuildingConstructiveElement",
    "BuildingFurniture",
    "BuildingStorey",
    "BuildingRoom",
    "BuildingUnit",
    "CityFurniture",
    "CityObjectGroup",
    "GenericCityObject",
    "LandUse",
    "OtherConstruction",
    "PlantCover",
    "SolitaryVegetationObject",
    "TINRelief",
    "WaterBody",
    "Road",
    "Railway",
    "Waterway",
    "TransportSquare",
    "Tunnel",
    "TunnelPart",
    "TunnelInstallation",
    "TunnelConstructiveElement",
    "TunnelHollowSpace",
    "TunnelFurniture",
];

impl CityObjectType {
    /// Parse a type tag, naming the owning object on failure
    pub fn parse_for(uid: &str, type_name: &str) -> Result<Self> {
        type_name.parse().map_err(|_| Error::UnknownType {
            uid: uid.to_string(),
            type_name: type_name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            CityObjectType::Bridge => "Bridge",
            CityObjectType::BridgePart => "BridgePart",
            CityObjectType::BridgeInstallation => "BridgeInstallation",
            CityObjectType::BridgeConstructionElement => "BridgeConstructionElement",
            CityObjectType::BridgeConstructiveElement => "BridgeConstructiveElement",
            CityObjectType::BridgeRoom => "BridgeRoom",
            CityObjectType::BridgeFurniture => "BridgeFurniture",
            CityObjectType::Building => "Building",
            CityObjectType::BuildingPart => "BuildingPart",
            CityObjectType::BuildingInstallation => "BuildingInstallation",
            CityObjectType::BuildingConstructiveElement => "BuildingConstructiveElement",
            CityObjectType::BuildingFurniture => "BuildingFurniture",
            CityObjectType::BuildingStorey => "BuildingStorey",
            CityObjectType::BuildingRoom => "BuildingRoom",
            CityObjectType::BuildingUnit => "BuildingUnit",
            CityObjectType::CityFurniture => "CityFurniture",
            CityObjectType::CityObjectGroup => "CityObjectGroup",
            CityObjectType::GenericCityObject => "GenericCityObject",
            CityObjectType::LandUse => "LandUse",
            CityObjectType::OtherConstruction => "OtherConstruction",
            CityObjectType::PlantCover => "PlantCover",
            CityObjectType::SolitaryVegetationObject => "SolitaryVegetationObject",
            CityObjectType::TINRelief => "TINRelief",
            CityObjectType::WaterBody => "WaterBody",
            CityObjectType::Road => "Road",
            CityObjectType::Railway => "Railway",
            CityObjectType::Waterway => "Waterway",
            CityObjectType::TransportSquare => "TransportSquare",
            CityObjectType::Tunnel => "Tunnel",
            CityObjectType::TunnelPart => "TunnelPart",
            CityObjectType::TunnelInstallation => "TunnelInstallation",
            CityObjectType::TunnelConstructiveElement => "TunnelConstructiveElement",
            CityObjectType::TunnelHollowSpace => "TunnelHollowSpace",
            CityObjectType::TunnelFurniture => "TunnelFurniture",
            CityObjectType::Extension(name) => name,
        }
    }

    /// Storage kind for this type, `None` if the type cannot be stored
    pub fn store_kind(&self) -> Option<StoreKind> {
        match self {
            CityObjectType::Building | CityObjectType::BuildingPart => Some(StoreKind::Building),
            CityObjectType::Bridge | CityObjectType::BridgePart => Some(StoreKind::Bridge),
            CityObjectType::BridgeInstallation
            | CityObjectType::BridgeConstructionElement
            | CityObjectType::BridgeConstructiveElement => Some(StoreKind::BridgeInstallation),
            CityObjectType::CityFurniture => Some(StoreKind::CityFurniture),
            CityObjectType::LandUse => Some(StoreKind::LandUse),
            CityObjectType::PlantCover => Some(StoreKind::PlantCover),
            CityObjectType::Railway | CityObjectType::Road | CityObjectType::TransportSquare => {
                Some(StoreKind::Transportation)
            }
            CityObjectType::SolitaryVegetationObject => Some(StoreKind::SolitaryVegetationObject),
            CityObjectType::TINRelief => Some(StoreKind::TINRelief),
            CityObjectType::Tunnel | CityObjectType::TunnelPart => Some(StoreKind::Tunnel),
            CityObjectType::TunnelInstallation => Some(StoreKind::TunnelInstallation),
            CityObjectType::WaterBody => Some(StoreKind::WaterBody),
            CityObjectType::CityObjectGroup
            | CityObjectType::BridgeRoom
            | CityObjectType::BridgeFurniture
            | CityObjectType::BuildingInstallation
            | CityObjectType::BuildingConstructiveElement
            | CityObjectType::BuildingFurniture
            | CityObjectType::BuildingStorey
            | CityObjectType::BuildingRoom
            | CityObjectType::BuildingUnit
            | CityObjectType::GenericCityObject
            | CityObjectType::OtherConstruction
            | CityObjectType::Waterway
            | CityObjectType::TunnelConstructiveElement
            | CityObjectType::TunnelHollowSpace
            | CityObjectType::TunnelFurniture
            | CityObjectType::Extension(_) => None,
        }
    }

    /// `BuildingPart`, `BridgePart` and `TunnelPart`
    pub fn is_part(&self) -> bool {
        matches!(
            self,
            CityObjectType::BuildingPart | CityObjectType::BridgePart | CityObjectType::TunnelPart
        )
    }
}

impl FromStr for CityObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let t = match s {
            "Bridge" => CityObjectType::Bridge,
            "BridgePart" => CityObjectType::BridgePart,
            "BridgeInstallation" => CityObjectType::BridgeInstallation,
            "BridgeConstructionElement" => CityObjectType::BridgeConstructionElement,
            "BridgeConstructiveElement" => CityObjectType::BridgeConstructiveElement,
            "BridgeRoom" => CityObjectType::BridgeRoom,
            "BridgeFurniture" => CityObjectType::BridgeFurniture,
            "Building" => CityObjectType::Building,
            "BuildingPart" => CityObjectType::BuildingPart,
            "BuildingInstallation" => CityObjectType::BuildingInstallation,
            "BuildingConstructiveElement" => CityObjectType::BuildingConstructiveElement,
            "BuildingFurniture" => CityObjectType::BuildingFurniture,
            "BuildingStorey" => CityObjectType::BuildingStorey,
            "BuildingRoom" => CityObjectType::BuildingRoom,
            "BuildingUnit" => CityObjectType::BuildingUnit,
            "CityFurniture" => CityObjectType::CityFurniture,
            "CityObjectGroup" => CityObjectType::CityObjectGroup,
            "GenericCityObject" => CityObjectType::GenericCityObject,
            "LandUse" => CityObjectType::LandUse,
            "OtherConstruction" => CityObjectType::OtherConstruction,
            "PlantCover" => CityObjectType::PlantCover,
            "SolitaryVegetationObject" => CityObjectType::SolitaryVegetationObject,
            "TINRelief" => CityObjectType::TINRelief,
            "WaterBody" => CityObjectType::WaterBody,
            "Road" => CityObjectType::Road,
            "Railway" => CityObjectType::Railway,
            "Waterway" => CityObjectType::Waterway,
            "TransportSquare" => CityObjectType::TransportSquare,
            "Tunnel" => CityObjectType::Tunnel,
            "TunnelPart" => CityObjectType::TunnelPart,
            "TunnelInstallation" => CityObjectType::TunnelInstallation,
            "TunnelConstructiveElement" => CityObjectType::TunnelConstructiveElement,
            "TunnelHollowSpace" => CityObjectType::TunnelHollowSpace,
            "TunnelFurniture" => CityObjectType::TunnelFurniture,
            ext if ext.len() > 1 && ext.starts_with('+') => {
                CityObjectType::Extension(ext.to_string())
            }
            other => {
                return Err(Error::UnknownType {
                    uid: String::new(),
                    type_name: other.to_string(),
                })
            }
        };
        Ok(t)
    }
}

impl TryFrom<String> for CityObjectType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CityObjectType> for String {
    fn from(t: CityObjectType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for CityObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage shapes; each kind has its own collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StoreKind {
    Building,
    Bridge,
    BridgeInstallation,
    CityFurniture,
    LandUse,
    PlantCover,
    Transportation,
    SolitaryVegetationObject,
    TINRelief,
    Tunnel,
    TunnelInstallation,
    WaterBody,
}

impl StoreKind {
    pub const ALL: [StoreKind; 12] = [
        StoreKind::Building,
        StoreKind::Bridge,
        StoreKind::BridgeInstallation,
        StoreKind::CityFurniture,
        StoreKind::LandUse,
        StoreKind::PlantCover,
        StoreKind::Transportation,
        StoreKind::SolitaryVegetationObject,
        StoreKind::TINRelief,
        StoreKind::Tunnel,
        StoreKind::TunnelInstallation,
        StoreKind::WaterBody,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Building => "Building",
            StoreKind::Bridge => "Bridge",
            StoreKind::BridgeInstallation => "BridgeInstallation",
            StoreKind::CityFurniture => "CityFurniture",
            StoreKind::LandUse => "LandUse",
            StoreKind::PlantCover => "PlantCover",
            StoreKind::Transportation => "Transportation",
            StoreKind::SolitaryVegetationObject => "SolitaryVegetationObject",
            StoreKind::TINRelief => "TINRelief",
            StoreKind::Tunnel => "Tunnel",
            StoreKind::TunnelInstallation => "TunnelInstallation",
            StoreKind::WaterBody => "WaterBody",
        }
    }

    /// Geometry types a record of this kind may carry
    pub fn allowed_geometry(self) -> &'static [GeometryType] {
        use GeometryType::*;
        match self {
            StoreKind::Building | StoreKind::Bridge | StoreKind::Tunnel => {
                &[Solid, CompositeSolid, MultiSurface]
            }
            StoreKind::BridgeInstallation
            | StoreKind::TunnelInstallation
            | StoreKind::CityFurniture
            | StoreKind::SolitaryVegetationObject => &GeometryType::ALL,
            StoreKind::LandUse => &[MultiSurface, CompositeSurface],
            StoreKind::PlantCover => &[MultiSurface, MultiSolid],
            StoreKind::Transportation => &[MultiSurface, CompositeSurface, MultiLineString],
            StoreKind::TINRelief => &[CompositeSurface],
            StoreKind::WaterBody => &[
                MultiLineString,
                MultiSurface,
                CompositeSurface,
                Solid,
                CompositeSolid,
            ],
        }
    }

    #[inline]
    pub fn allows(self, geometry_type: GeometryType) -> bool {
        self.allowed_geometry().contains(&geometry_type)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
