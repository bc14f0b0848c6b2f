//! Material records: per-kind texture references and a typed property map.

use std::collections::BTreeMap;

use crate::data_structures::database::{MaterialId, TextureId};

/// Texture slots a mesh can bind, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureKind {
    BaseColor,
    Normal,
    MetalnessRoughness,
}

impl TextureKind {
    /// Fixed resolution order. Sampler units are handed out in this order, never
    /// in the order a material happens to declare its textures.
    pub const ALL: [TextureKind; 3] = [
        TextureKind::BaseColor,
        TextureKind::Normal,
        TextureKind::MetalnessRoughness,
    ];

    pub fn index(self) -> usize {
        match self {
            TextureKind::BaseColor => 0,
            TextureKind::Normal => 1,
            TextureKind::MetalnessRoughness => 2,
        }
    }

    /// Name of the sampler uniform the shaders read this kind from.
    pub fn sampler_uniform(self) -> &'static str {
        match self {
            TextureKind::BaseColor => "s_texBaseColor",
            TextureKind::Normal => "s_texNormal",
            TextureKind::MetalnessRoughness => "s_texORM",
        }
    }

    /// Only colour data is stored in sRGB; normal and ORM maps are linear.
    pub fn is_srgb(self) -> bool {
        matches!(self, TextureKind::BaseColor)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropertyValue {
    Float(f32),
    Bool(bool),
    U32(u32),
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::U32(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialPropertyGroup {
    General,
    BaseColor,
    Normal,
    Metallic,
    Roughness,
    Occlusion,
    Emissive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialProperty {
    Factor,
    Texture,
    UseTexture,
    EnableDirectionalLights,
    EnablePunctualLights,
    EnableAreaLights,
    EnableIbl,
}

/// String key under which a property of a group is stored, e.g. `BaseColor|Factor`.
pub fn property_key(group: MaterialPropertyGroup, property: MaterialProperty) -> String {
    format!("{group:?}|{property:?}")
}

/// String-keyed material properties. Lookups are typed: asking for a float
/// under a key that holds a bool yields `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyMap(BTreeMap<String, PropertyValue>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<PropertyValue> {
        self.0.get(key).copied()
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        match self.get(key)? {
            PropertyValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            PropertyValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.get(key)? {
            PropertyValue::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialRecord {
    /// Assigned by the database on insertion.
    pub id: MaterialId,
    pub name: String,
    textures: [Option<TextureId>; 3],
    pub properties: PropertyMap,
}

impl MaterialRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            textures: [None; 3],
            properties: PropertyMap::new(),
        }
    }

    pub fn with_texture(mut self, kind: TextureKind, texture: TextureId) -> Self {
        self.set_texture(kind, Some(texture));
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn set_texture(&mut self, kind: TextureKind, texture: Option<TextureId>) {
        self.textures[kind.index()] = texture;
    }

    pub fn texture(&self, kind: TextureKind) -> Option<TextureId> {
        self.textures[kind.index()]
    }

    /// Texture references in [`TextureKind::ALL`] order, skipping unset kinds.
    pub fn textures(&self) -> impl Iterator<Item = (TextureKind, TextureId)> + '_ {
        TextureKind::ALL
            .into_iter()
            .filter_map(|kind| self.texture(kind).map(|id| (kind, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookups_do_not_coerce() {
        let key = property_key(MaterialPropertyGroup::BaseColor, MaterialProperty::UseTexture);
        let mut props = PropertyMap::new();
        props.insert(key.clone(), PropertyValue::Bool(true));

        assert_eq!(props.get_bool(&key), Some(true));
        assert_eq!(props.get_f32(&key), None);
        assert_eq!(props.get_u32("missing"), None);
    }

    #[test]
    fn textures_follow_kind_order_not_insertion_order() {
        let material = MaterialRecord::new("m")
            .with_texture(TextureKind::MetalnessRoughness, 7)
            .with_texture(TextureKind::BaseColor, 3);
        let order: Vec<_> = material.textures().collect();
        assert_eq!(
            order,
            vec![(TextureKind::BaseColor, 3), (TextureKind::MetalnessRoughness, 7)]
        );
    }

    #[test]
    fn keys_are_stable() {
        assert_eq!(
            property_key(MaterialPropertyGroup::General, MaterialProperty::EnableIbl),
            "General|EnableIbl"
        );
    }
}
