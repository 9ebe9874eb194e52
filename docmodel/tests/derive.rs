use docmodel::{
    prelude::*,
    relation::RelationDeclaration,
    schema::{ClassRef, Items},
};
use std::any::TypeId;

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
struct Address {
    street: String,
    zip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
#[model(
    name = "Person",
    collection = "people",
    database = "crm",
    description = "A contact",
    additional_properties,
    validation_level = "moderate",
    validation_action = "warn",
    sync = "override"
)]
struct Contact {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(rename = "fullName")]
    full_name: String,
    #[serde(rename = "years")]
    #[field(name = "years")]
    age: u8,
    #[index(direction = -1, name = "by_visits")]
    visits: i64,
    score: f64,
    active: bool,
    tags: Vec<String>,
    address: Address,
    #[field(type = "string[]")]
    labels: Bson,
    #[field(default = "draft")]
    status: String,
    #[serde(skip)]
    #[field(skip)]
    cache: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
#[model(collection = "pets")]
struct Pet {
    name: String,
    owner_id: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
#[model(collection = "owners")]
struct Owner {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[relation(foreign_field = "owner_id")]
    pets: Option<Vec<Pet>>,
    #[relation(
        kind = "one_to_one",
        target = Pet,
        local_field = "favorite_id",
        foreign_field = "_id"
    )]
    favorite: Option<Bson>,
}

fn declared<T: Model>() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.declare::<T>().unwrap();
    catalog
}

#[test]
fn derived_fields_follow_rust_types() {
    let catalog = declared::<Contact>();
    let schema = catalog.schema_of::<Contact>().unwrap();
    let properties = schema.properties.as_ref().unwrap();

    assert_eq!(
        properties.names().collect::<Vec<_>>(),
        vec![
            "_id", "fullName", "years", "visits", "score", "active", "tags", "address", "labels",
            "status",
        ]
    );

    let type_of = |name: &str| properties.get(name).unwrap().schema_type.clone();
    assert_eq!(type_of("_id"), SchemaType::ObjectId);
    assert_eq!(type_of("fullName"), SchemaType::String);
    assert_eq!(type_of("years"), SchemaType::Integer);
    assert_eq!(type_of("visits"), SchemaType::Long);
    assert_eq!(type_of("score"), SchemaType::Number);
    assert_eq!(type_of("active"), SchemaType::Boolean);

    assert_eq!(properties.get("tags").unwrap(), &Schema::array(Schema::string()));
    assert_eq!(properties.get("labels").unwrap(), &Schema::array(Schema::string()));
    assert_eq!(properties.get("status").unwrap().default, Some(Bson::from("draft")));

    let address = properties.get("address").unwrap();
    assert_eq!(address.class, Some(ClassRef::of::<Address>()));
    assert_eq!(address, catalog.schema_of::<Address>().unwrap());
    assert_eq!(address.required, vec!["street".to_string()]);

    assert!(!schema.required.contains(&"_id".to_string()));
    assert!(schema.required.contains(&"status".to_string()));
}

#[test]
fn model_attributes_shape_the_class_and_its_binding() {
    let catalog = declared::<Contact>();
    let class = catalog.class_schema::<Contact>().unwrap();

    assert_eq!(class.name, "Person");
    assert_eq!(class.schema.description.as_deref(), Some("A contact"));
    assert!(class.schema.allows_additional_properties());

    let binding = class.binding().unwrap();
    assert_eq!(binding.name, "people");
    assert_eq!(binding.database.as_deref(), Some("crm"));
    assert_eq!(
        binding.validation,
        Some(
            ValidationPolicy::new()
                .level(ValidationLevel::Moderate)
                .action(ValidationAction::Warn)
                .sync(SyncStrategy::Override)
        )
    );
    assert_eq!(class.namespace(Some("ignored")).unwrap(), Namespace::new("crm", "people"));

    assert_eq!(
        catalog.indexes_by_id(TypeId::of::<Contact>()),
        &[IndexDeclaration::single("visits").spec(-1).name("by_visits")]
    );
}

#[test]
fn nested_models_are_declared_but_not_bound() {
    let catalog = declared::<Contact>();

    assert!(catalog.class_schema::<Address>().is_some());
    assert_eq!(
        catalog.collection_schema::<Address>().unwrap_err(),
        DocModelError::NotACollection("Address".to_string())
    );
}

#[test]
fn relations_infer_their_kind_from_the_field_type() {
    let catalog = declared::<Owner>();
    let owner = TypeId::of::<Owner>();

    assert_eq!(
        catalog.relation_by_id(owner, "pets"),
        Some(&RelationDeclaration {
            kind: RelationKind::OneToMany,
            target: ClassRef::of::<Pet>(),
            local_field: "_id".to_string(),
            foreign_field: "owner_id".to_string(),
        })
    );
    assert_eq!(
        catalog.relation_by_id(owner, "favorite"),
        Some(&RelationDeclaration {
            kind: RelationKind::OneToOne,
            target: ClassRef::of::<Pet>(),
            local_field: "favorite_id".to_string(),
            foreign_field: "_id".to_string(),
        })
    );

    let schema = catalog.schema_of::<Owner>().unwrap();
    let pets = schema.properties.as_ref().unwrap().get("pets").unwrap();
    let pet = Some(ClassRef::of::<Pet>());
    assert!(matches!(&pets.items, Some(Items::Uniform(item)) if item.class == pet));
    assert!(schema.required.is_empty());
}
