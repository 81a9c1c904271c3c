use geo::Rect;
use serde::Serialize;
use std::fmt;

use crate::xml::QName;

/// Value space of a feature property, as declared in the application schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
    String,
    Integer,
    Decimal,
    Double,
    Boolean,
    Date,
    DateTime,
    Uri,
    /// GML geometry property; carries the geometry type name, e.g. `Point`.
    Geometry(String),
    Other(String),
}

impl PropertyType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal | Self::Double)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, Self::Geometry(_))
    }

    /// Types with a total order usable in range comparisons.
    pub fn is_ordered(&self) -> bool {
        self.is_numeric() || self.is_temporal()
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Geometry(_) | Self::Other(_))
    }

    pub fn from_xsd(local_name: &str) -> Self {
        match local_name {
            "string" | "normalizedString" | "token" | "language" | "Name" | "NCName" | "ID" => {
                Self::String
            }
            "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger"
            | "positiveInteger" | "nonPositiveInteger" | "negativeInteger" | "unsignedLong"
            | "unsignedInt" | "unsignedShort" | "unsignedByte" => Self::Integer,
            "decimal" => Self::Decimal,
            "double" | "float" => Self::Double,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            "anyURI" => Self::Uri,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn from_gml(local_name: &str) -> Self {
        const GEOMETRY_WORDS: [&str; 8] = [
            "Point", "Curve", "Surface", "Geometr", "LineString", "Polygon", "Solid", "Envelope",
        ];
        match local_name {
            "CodeType" | "CodeWithAuthorityType" => Self::String,
            "MeasureType" | "LengthType" | "AngleType" => Self::Double,
            name if !name.starts_with("Time")
                && GEOMETRY_WORDS.iter().any(|w| name.contains(w)) =>
            {
                let kind = name
                    .trim_end_matches("PropertyType")
                    .trim_end_matches("Type")
                    .to_string();
                Self::Geometry(kind)
            }
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Decimal => write!(f, "decimal"),
            Self::Double => write!(f, "double"),
            Self::Boolean => write!(f, "boolean"),
            Self::Date => write!(f, "date"),
            Self::DateTime => write!(f, "dateTime"),
            Self::Uri => write!(f, "anyURI"),
            Self::Geometry(kind) => write!(f, "geometry({})", kind),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: QName,
    pub property_type: PropertyType,
    pub nillable: bool,
    pub min_occurs: u32,
    pub enumerations: Vec<String>,
}

impl PropertyDescriptor {
    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    pub fn is_optional(&self) -> bool {
        self.min_occurs == 0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTypeInfo {
    pub name: QName,
    pub title: Option<String>,
    pub default_crs: Option<String>,
    pub other_crs: Vec<String>,
    /// WGS84 extent advertised in the capabilities document
    #[serde(skip)]
    pub extent: Option<Rect<f64>>,
    /// Properties in declaration order
    pub properties: Vec<PropertyDescriptor>,
    pub count_estimate: Option<u64>,
}

impl FeatureTypeInfo {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            title: None,
            default_crs: None,
            other_crs: Vec::new(),
            extent: None,
            properties: Vec::new(),
            count_estimate: None,
        }
    }

    pub fn property(&self, local_name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.local_name() == local_name)
    }

    pub fn geometry_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties
            .iter()
            .filter(|p| p.property_type.is_geometry())
    }

    pub fn temporal_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties
            .iter()
            .filter(|p| p.property_type.is_temporal())
    }
}
