#![no_main]

use std::sync::{Arc, OnceLock};

use codec::{CodecLimits, Decoder};
use libfuzzer_sys::fuzz_target;
use schema::{ChildType, FieldDef, FieldType, PrimitiveType, TypeDef, TypeRegistry};

fn registry() -> Arc<TypeRegistry> {
    static REGISTRY: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
    let registry = REGISTRY.get_or_init(|| {
        let registry = TypeRegistry::builder()
            .register(
                TypeDef::new("Item")
                    .field(FieldDef::new("name", FieldType::string()))
                    .field(FieldDef::new("qty", FieldType::primitive(PrimitiveType::UInt8))),
            )
            .register(TypeDef::new("Rare").extends("Item"))
            .register(
                TypeDef::new("Root")
                    .field(FieldDef::new("tick", FieldType::number()))
                    .field(FieldDef::new("items", FieldType::array(ChildType::schema("Item"))))
                    .field(FieldDef::new("bag", FieldType::map(ChildType::schema("Item"))))
                    .field(FieldDef::new("tags", FieldType::set(PrimitiveType::String)))
                    .field(FieldDef::new("best", FieldType::schema("Item"))),
            )
            .build()
            .unwrap();
        Arc::new(registry)
    });
    Arc::clone(registry)
}

fuzz_target!(|data: &[u8]| {
    let mut decoder = Decoder::with_limits(registry(), "Root", CodecLimits::for_testing()).unwrap();
    // The first byte picks where the stream is cut into two patches.
    let (first, second) = match data.split_first() {
        Some((&cut, rest)) => rest.split_at(usize::from(cut).min(rest.len())),
        None => (data, data),
    };
    let _ = decoder.decode(first);
    let _ = decoder.decode(second);
    let _ = decoder.snapshot();
});
