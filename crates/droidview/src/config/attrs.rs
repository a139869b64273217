//! SDK-era attribute-name tables
//!
//! The on-device dump formats changed their attribute names across Android
//! releases. Each generation is captured as an [`Era`]; the view tree keeps
//! the era it was parsed under so accessors can resolve the right name.

use phf::phf_map;

/// Attribute-name generation of a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era {
    /// Line-oriented view-server dumps up to SDK 9: bare member names.
    Froyo,
    /// Line-oriented view-server dumps from SDK 10 on: category-prefixed
    /// names (`layout:mLeft`, `text:mText`).
    IceCreamSandwich,
    /// Instrumentation XML dumps (SDK 16 and later): short attribute names
    /// and absolute `bounds`.
    JellyBean,
}

impl Era {
    /// Era of a line-oriented dump produced by the given SDK version.
    pub fn for_line_dump(sdk: u32) -> Era {
        if sdk <= 9 {
            Era::Froyo
        } else {
            Era::IceCreamSandwich
        }
    }

    /// Era of an instrumentation XML dump.
    pub fn for_xml_dump() -> Era {
        Era::JellyBean
    }

    pub fn names(self) -> &'static AttrNames {
        match self {
            Era::Froyo => &FROYO_ATTRS,
            Era::IceCreamSandwich => &ICS_ATTRS,
            Era::JellyBean => &JELLY_BEAN_ATTRS,
        }
    }
}

/// Attribute names used by one era.
///
/// `left`/`top`/`width`/`height`/`visibility` are `None` for the XML era,
/// where bounds are reported absolute and only visible nodes are dumped.
#[derive(Debug)]
pub struct AttrNames {
    pub id: &'static str,
    pub text: &'static str,
    pub content_description: &'static str,
    pub left: Option<&'static str>,
    pub top: Option<&'static str>,
    pub width: Option<&'static str>,
    pub height: Option<&'static str>,
    pub visibility: Option<&'static str>,
}

pub static FROYO_ATTRS: AttrNames = AttrNames {
    id: "mID",
    text: "mText",
    content_description: "getContentDescription()",
    left: Some("mLeft"),
    top: Some("mTop"),
    width: Some("getWidth()"),
    height: Some("getHeight()"),
    visibility: Some("getVisibility()"),
};

pub static ICS_ATTRS: AttrNames = AttrNames {
    id: "mID",
    text: "text:mText",
    content_description: "accessibility:getContentDescription()",
    left: Some("layout:mLeft"),
    top: Some("layout:mTop"),
    width: Some("layout:getWidth()"),
    height: Some("layout:getHeight()"),
    visibility: Some("getVisibility()"),
};

pub static JELLY_BEAN_ATTRS: AttrNames = AttrNames {
    id: "resource-id",
    text: "text",
    content_description: "content-desc",
    left: None,
    top: None,
    width: None,
    height: None,
    visibility: None,
};

/// Canonical field an attribute name maps to, independent of era.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalAttr {
    Id,
    Text,
    ContentDescription,
    Left,
    Top,
    Width,
    Height,
    Visibility,
    Class,
    Bounds,
}

/// Every known attribute-name variant, mapped to its canonical field.
pub static CANONICAL_ATTRS: phf::Map<&'static str, CanonicalAttr> = phf_map! {
    "mID" => CanonicalAttr::Id,
    "resource-id" => CanonicalAttr::Id,
    "mText" => CanonicalAttr::Text,
    "text:mText" => CanonicalAttr::Text,
    "text" => CanonicalAttr::Text,
    "getContentDescription()" => CanonicalAttr::ContentDescription,
    "accessibility:getContentDescription()" => CanonicalAttr::ContentDescription,
    "content-desc" => CanonicalAttr::ContentDescription,
    "mLeft" => CanonicalAttr::Left,
    "layout:mLeft" => CanonicalAttr::Left,
    "mTop" => CanonicalAttr::Top,
    "layout:mTop" => CanonicalAttr::Top,
    "getWidth()" => CanonicalAttr::Width,
    "layout:getWidth()" => CanonicalAttr::Width,
    "getHeight()" => CanonicalAttr::Height,
    "layout:getHeight()" => CanonicalAttr::Height,
    "getVisibility()" => CanonicalAttr::Visibility,
    "class" => CanonicalAttr::Class,
    "bounds" => CanonicalAttr::Bounds,
};

/// Resolve an attribute name from any era to its canonical field.
pub fn canonical(name: &str) -> Option<CanonicalAttr> {
    CANONICAL_ATTRS.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_era_from_sdk() {
        assert_eq!(Era::for_line_dump(8), Era::Froyo);
        assert_eq!(Era::for_line_dump(9), Era::Froyo);
        assert_eq!(Era::for_line_dump(10), Era::IceCreamSandwich);
        assert_eq!(Era::for_line_dump(19), Era::IceCreamSandwich);
        assert_eq!(Era::for_xml_dump(), Era::JellyBean);
    }

    #[test]
    fn test_canonical_lookup_across_eras() {
        assert_eq!(canonical("mText"), Some(CanonicalAttr::Text));
        assert_eq!(canonical("text:mText"), Some(CanonicalAttr::Text));
        assert_eq!(canonical("text"), Some(CanonicalAttr::Text));
        assert_eq!(canonical("resource-id"), Some(CanonicalAttr::Id));
        assert_eq!(canonical("layout:mLeft"), Some(CanonicalAttr::Left));
        assert_eq!(canonical("no_such_attr"), None);
    }

    #[test]
    fn test_xml_era_has_no_layout_names() {
        let names = Era::JellyBean.names();
        assert!(names.left.is_none());
        assert!(names.visibility.is_none());
        assert_eq!(names.id, "resource-id");
    }
}
