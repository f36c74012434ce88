use std::sync::Arc;

use serde::{Deserialize, Serialize};
use topicgraph_core::config::Config;
use topicgraph_core::mapping::{
    AssociationTypes, BindingModel, BindingValue, CollectionSource, MappingError, ModelDescriptor,
    ModelValue, PropertyDescriptor, ReverseTopicMappingService, ScalarType, ScalarValue,
    StaticTypeLookupService, TopicMappingService,
};
use topicgraph_core::config::RepositoryConfig;
use topicgraph_core::repository::{InMemoryTopicStore, TopicRepository};
use topicgraph_core::schema::{
    AttributeDescriptor, ContentTypeDescriptor, ContentTypeDescriptorCollection,
};
use topicgraph_core::topic::{Topic, TopicFactory};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn create_test_schema() -> Arc<ContentTypeDescriptorCollection> {
    let schema = ContentTypeDescriptorCollection::with_builtins();
    schema.register(
        ContentTypeDescriptor::new("Page")
            .with_attribute(AttributeDescriptor::scalar("Title"))
            .with_attribute(AttributeDescriptor::scalar("IsFeatured"))
            .with_attribute(AttributeDescriptor::relationship("Related"))
            .with_attribute(AttributeDescriptor::reference("Author")),
    );
    Arc::new(schema)
}

fn page_view_model() -> ModelDescriptor {
    ModelDescriptor::new("PageViewModel")
        .with(PropertyDescriptor::text("Key"))
        .with(PropertyDescriptor::text("Title"))
        .with(PropertyDescriptor::list("Related", None).include(AssociationTypes::RELATIONSHIPS))
}

fn mapping_service(types: StaticTypeLookupService) -> TopicMappingService {
    TopicMappingService::new(
        Arc::new(InMemoryTopicStore::new()),
        Arc::new(types),
        create_test_schema(),
    )
}

fn reverse_service() -> ReverseTopicMappingService {
    let types = StaticTypeLookupService::new().with(
        ModelDescriptor::new("PageBindingModel")
            .with(PropertyDescriptor::text("Key"))
            .with(PropertyDescriptor::text("Title"))
            .with(PropertyDescriptor::scalar("IsFeatured", ScalarType::Bool))
            .with(PropertyDescriptor::key_list("Related"))
            .with(PropertyDescriptor::key("Author")),
    );
    ReverseTopicMappingService::new(
        Arc::new(InMemoryTopicStore::new()),
        Arc::new(types),
        create_test_schema(),
    )
}

#[tokio::test]
async fn test_relationship_cycle_maps_each_topic_once() {
    init_tracing();
    let root = TopicFactory::create_with_id("Root", "Page", None, 1).unwrap();
    let a = TopicFactory::create_with_id("A", "Page", Some(&root), 2).unwrap();
    let b = TopicFactory::create_with_id("B", "Page", Some(&root), 3).unwrap();
    a.relationships().set_value("Related", &b);
    b.relationships().set_value("Related", &a);

    let service = mapping_service(StaticTypeLookupService::new().with(page_view_model()));
    let graph = service.map(&a).await.unwrap();

    assert_eq!(graph.len(), 2);
    let related = graph.related(graph.root_id(), "Related");
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].topic_key, "B");
    assert_eq!(related[0].models("Related"), &[graph.root_id()]);
}

#[tokio::test]
async fn test_unsaved_cycle_terminates() {
    init_tracing();
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let a = TopicFactory::create("A", "Page", Some(&root)).unwrap();
    let b = TopicFactory::create("B", "Page", Some(&root)).unwrap();
    a.relationships().set_value("Related", &b);
    b.relationships().set_value("Related", &a);

    let service = mapping_service(StaticTypeLookupService::new().with(page_view_model()));
    let graph = service.map(&a).await.unwrap();

    assert_eq!(graph.len(), 2);
    let json = graph.to_json(graph.root_id());
    assert_eq!(json["Related"][0]["Key"], "B");
    assert_eq!(json["Related"][0]["Related"][0]["Key"], "A");
}

#[tokio::test]
async fn test_children_parent_and_references() {
    let types = StaticTypeLookupService::new().with(
        ModelDescriptor::new("PageViewModel")
            .with(PropertyDescriptor::text("Key"))
            .with(PropertyDescriptor::list("Children", None))
            .with(PropertyDescriptor::model("Parent", None))
            .with(PropertyDescriptor::key("Author"))
            .with(PropertyDescriptor::model("Sponsor", None)),
    );
    let root = TopicFactory::create_with_id("Root", "Page", None, 1).unwrap();
    let section = TopicFactory::create_with_id("Section", "Page", Some(&root), 2).unwrap();
    TopicFactory::create_with_id("First", "Page", Some(&section), 3).unwrap();
    TopicFactory::create_with_id("Second", "Page", Some(&section), 4).unwrap();
    let author = TopicFactory::create_with_id("Author", "Page", Some(&root), 5).unwrap();
    section.references().set_value("Author", Some(&author));
    section.set_attribute("SponsorId", "5").unwrap();

    let graph = mapping_service(types).map(&section).await.unwrap();
    let model = graph.root();

    let children: Vec<_> = graph
        .related(graph.root_id(), "Children")
        .iter()
        .map(|m| m.topic_key.clone())
        .collect();
    assert_eq!(children, vec!["First", "Second"]);

    let parent = graph.get(model.model("Parent").unwrap()).unwrap();
    assert_eq!(parent.topic_key, "Root");
    assert_eq!(model.get("Author"), Some(&ModelValue::Key("Root:Author".to_string())));
    let sponsor = graph.get(model.model("Sponsor").unwrap()).unwrap();
    assert_eq!(sponsor.topic_id, 5);
}

#[tokio::test]
async fn test_missing_id_reference_is_unresolved() {
    let types = StaticTypeLookupService::new().with(
        ModelDescriptor::new("PageViewModel").with(PropertyDescriptor::model("Sponsor", None)),
    );
    let page = TopicFactory::create_with_id("Page", "Page", None, 1).unwrap();
    page.set_attribute("SponsorId", "99").unwrap();

    let result = mapping_service(types).map(&page).await;
    assert!(matches!(result, Err(MappingError::Unresolved { .. })));
}

#[tokio::test]
async fn test_associations_limit_what_is_mapped() {
    let types = StaticTypeLookupService::new().with(
        ModelDescriptor::new("PageViewModel")
            .with(PropertyDescriptor::text("Key"))
            .with(PropertyDescriptor::list("Children", None))
            .with(PropertyDescriptor::key_list("Related")),
    );
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let child = TopicFactory::create("Child", "Page", Some(&root)).unwrap();
    root.relationships().set_value("Related", &child);

    let graph = mapping_service(types)
        .map_with(&root, AssociationTypes::RELATIONSHIPS)
        .await
        .unwrap();

    assert_eq!(graph.len(), 1);
    assert!(graph.root().get("Children").is_none());
    assert_eq!(
        graph.root().get("Related"),
        Some(&ModelValue::Keys(vec!["Root:Child".to_string()]))
    );
}

#[tokio::test]
async fn test_metadata_lookup_list() {
    let types = StaticTypeLookupService::new()
        .with(
            ModelDescriptor::new("PageViewModel").with(
                PropertyDescriptor::list("Colors", Some("LookupItemViewModel")).metadata("Colors"),
            ),
        )
        .with(ModelDescriptor::new("LookupItemViewModel").with(PropertyDescriptor::text("Title")));
    let root = TopicFactory::create("Root", "Container", None).unwrap();
    let configuration = TopicFactory::create("Configuration", "Container", Some(&root)).unwrap();
    let metadata = TopicFactory::create("Metadata", "Container", Some(&configuration)).unwrap();
    let colors = TopicFactory::create("Colors", "Container", Some(&metadata)).unwrap();
    let list = TopicFactory::create("LookupList", "List", Some(&colors)).unwrap();
    let red = TopicFactory::create("Red", "LookupListItem", Some(&list)).unwrap();
    red.set_attribute("Title", "Crimson").unwrap();
    TopicFactory::create("Blue", "LookupListItem", Some(&list)).unwrap();
    let page = TopicFactory::create("Page", "Page", Some(&root)).unwrap();

    let graph = mapping_service(types).map(&page).await.unwrap();
    let titles: Vec<_> = graph
        .related(graph.root_id(), "Colors")
        .iter()
        .filter_map(|m| m.text("Title"))
        .collect();
    assert_eq!(titles, vec!["Crimson", "Blue"]);
}

#[tokio::test]
async fn test_collection_filters_flatten_and_dedupe() {
    init_tracing();
    let types = StaticTypeLookupService::new()
        .with(
            ModelDescriptor::new("PageViewModel")
                .with(
                    PropertyDescriptor::list("Featured", None)
                        .attribute_key("Children")
                        .source(CollectionSource::Children)
                        .filter_by_attribute("IsFeatured", "true"),
                )
                .with(
                    PropertyDescriptor::list("Articles", None)
                        .attribute_key("Children")
                        .filter_by_content_type("Article"),
                )
                .with(PropertyDescriptor::list("Everything", None).attribute_key("Children").flatten()),
        )
        .with(ModelDescriptor::new("ArticleViewModel").with(PropertyDescriptor::text("Key")));
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let a = TopicFactory::create("A", "Article", Some(&root)).unwrap();
    a.set_attribute("IsFeatured", "1").unwrap();
    TopicFactory::create("X", "Article", Some(&a)).unwrap();
    let b = TopicFactory::create("B", "Page", Some(&root)).unwrap();
    TopicFactory::create("A", "Article", Some(&b)).unwrap();
    let hidden = TopicFactory::create("Hidden", "Article", Some(&root)).unwrap();
    hidden.set_attribute("IsDisabled", "1").unwrap();

    let graph = mapping_service(types).map(&root).await.unwrap();
    let keys = |name: &str| -> Vec<String> {
        graph
            .related(graph.root_id(), name)
            .iter()
            .map(|m| m.topic_key.clone())
            .collect()
    };

    assert_eq!(keys("Featured"), vec!["A"]);
    assert_eq!(keys("Articles"), vec!["A"]);
    assert_eq!(keys("Everything"), vec!["A", "X", "B"]);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PageSummary {
    key: String,
    title: String,
    related: Vec<RelatedSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedSummary {
    key: String,
}

#[tokio::test]
async fn test_map_as_typed_model() {
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let a = TopicFactory::create("A", "Page", Some(&root)).unwrap();
    let b = TopicFactory::create("B", "Page", Some(&root)).unwrap();
    a.set_attribute("Title", "First page").unwrap();
    a.relationships().set_value("Related", &b);

    let service = mapping_service(StaticTypeLookupService::new().with(page_view_model()));
    let summary: PageSummary = service.map_as(&a, AssociationTypes::ALL).await.unwrap();

    assert_eq!(summary.key, "A");
    assert_eq!(summary.title, "First page");
    assert_eq!(summary.related.len(), 1);
    assert_eq!(summary.related[0].key, "B");
}

#[tokio::test]
async fn test_config_changes_view_model_convention() {
    let mut config = Config::default();
    config.mapping.view_model_suffix = "Card".to_string();
    config.mapping.default_associations = vec!["References".to_string()];
    let types = StaticTypeLookupService::new().with(
        ModelDescriptor::new("PageCard")
            .with(PropertyDescriptor::text("Key"))
            .with(PropertyDescriptor::list("Children", None)),
    );
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    TopicFactory::create("Child", "Page", Some(&root)).unwrap();

    let service = mapping_service(types).with_config(&config).unwrap();
    let graph = service.map(&root).await.unwrap();

    assert_eq!(graph.root().model_type, "PageCard");
    assert!(graph.root().get("Children").is_none());
}

#[tokio::test]
async fn test_view_model_round_trip_through_binding_model() {
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let page = TopicFactory::create("About", "Page", Some(&root)).unwrap();
    page.set_attribute("Title", "About us").unwrap();

    let types = StaticTypeLookupService::new().with(page_view_model());
    let graph = mapping_service(types).map(&page).await.unwrap();

    let descriptor = ModelDescriptor::new("PageBindingModel")
        .with(PropertyDescriptor::text("Key"))
        .with(PropertyDescriptor::text("Title"));
    let binding = BindingModel::from_view_model(graph.root(), "PageBindingModel", "Page", &descriptor)
        .text("Title", "About the team");
    assert_eq!(binding.key, "About");

    reverse_service().map(&binding, &page).await.unwrap();
    assert_eq!(page.get_value("Title").as_deref(), Some("About the team"));
    assert!(page.is_dirty(false, false));
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PageInput {
    key: String,
    title: String,
    is_featured: bool,
    related: Vec<String>,
    author: Option<String>,
}

#[tokio::test]
async fn test_reverse_mapping_binds_associations() {
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let page = TopicFactory::create("Page", "Page", Some(&root)).unwrap();
    let b = TopicFactory::create("B", "Page", Some(&root)).unwrap();
    let c = TopicFactory::create("C", "Page", Some(&root)).unwrap();
    let service = reverse_service();

    let input = PageInput {
        key: "Page".to_string(),
        title: "Landing".to_string(),
        is_featured: true,
        related: vec!["Root:B".to_string(), "Root:C".to_string()],
        author: Some("Root:C".to_string()),
    };
    service.map_from(&input, "PageBindingModel", &page).await.unwrap();

    assert_eq!(page.get_value("Title").as_deref(), Some("Landing"));
    assert_eq!(page.get_value("IsFeatured").as_deref(), Some("1"));
    assert_eq!(page.relationships().get_values("Related").len(), 2);
    assert!(b.incoming_relationships().contains("Related", &page));
    assert!(page.references().get_value("Author").is_some_and(|t| t.ptr_eq(&c)));

    let input = PageInput {
        related: vec!["Root:C".to_string()],
        author: None,
        ..input
    };
    service.map_from(&input, "PageBindingModel", &page).await.unwrap();

    let related = page.relationships().get_values("Related");
    assert_eq!(related.len(), 1);
    assert!(related[0].ptr_eq(&c));
    assert!(!b.incoming_relationships().contains("Related", &page));
    assert!(page.references().get_value("Author").is_none());
    assert_eq!(service.validator().len(), 1);
    assert!(service.validator().is_validated("PageBindingModel", "Page"));
}

#[tokio::test]
async fn test_reverse_mapping_unknown_key() {
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let page = TopicFactory::create("Page", "Page", Some(&root)).unwrap();
    let binding = BindingModel::new("PageBindingModel", "Page", "Page")
        .with("Related", BindingValue::Keys(vec!["Root:Missing".to_string()]));

    let result = reverse_service().map(&binding, &page).await;
    assert!(matches!(result, Err(MappingError::Unresolved { .. })));
}

#[tokio::test]
async fn test_reverse_mapping_creates_topic() {
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let binding = BindingModel::new("PageBindingModel", "Fresh", "Page")
        .text("Title", "Fresh page")
        .with("IsFeatured", BindingValue::Scalar(ScalarValue::Bool(false)));

    let topic = reverse_service().map_new(&binding, Some(&root)).await.unwrap();

    assert_eq!(topic.unique_key(), "Root:Fresh");
    assert_eq!(topic.get_value("Title").as_deref(), Some("Fresh page"));
    assert_eq!(topic.get_value("IsFeatured").as_deref(), Some("0"));
    assert!(topic.is_new());
}

fn ranked_schema() -> Arc<ContentTypeDescriptorCollection> {
    let schema = ContentTypeDescriptorCollection::with_builtins();
    schema.register(
        ContentTypeDescriptor::new("Page")
            .with_attribute(AttributeDescriptor::scalar("Title"))
            .with_attribute(AttributeDescriptor::scalar("IsFeatured"))
            .with_attribute(AttributeDescriptor::scalar("Rank"))
            .with_attribute(AttributeDescriptor::nested_topic("Sections")),
    );
    schema.register(
        ContentTypeDescriptor::new("Section").with_attribute(AttributeDescriptor::scalar("Title")),
    );
    Arc::new(schema)
}

#[tokio::test]
async fn test_scalars_survive_reverse_then_forward() {
    let schema = ranked_schema();
    let store = Arc::new(InMemoryTopicStore::new());
    let scalars = |name: &str| {
        ModelDescriptor::new(name)
            .with(PropertyDescriptor::text("Key"))
            .with(PropertyDescriptor::text("Title"))
            .with(PropertyDescriptor::scalar("IsFeatured", ScalarType::Bool))
            .with(PropertyDescriptor::scalar("Rank", ScalarType::Int))
    };
    let types = Arc::new(
        StaticTypeLookupService::new()
            .with(scalars("PageViewModel"))
            .with(scalars("PageBindingModel")),
    );
    let forward = TopicMappingService::new(store.clone(), types.clone(), schema.clone());
    let reverse = ReverseTopicMappingService::new(store, types, schema);

    let root = TopicFactory::create("Root", "Page", None).unwrap();
    let original = TopicFactory::create("About", "Page", Some(&root)).unwrap();
    original.set_attribute("Title", "About us").unwrap();
    original.set_attribute("IsFeatured", "1").unwrap();
    original.set_attribute("Rank", "3").unwrap();
    let before = forward.map(&original).await.unwrap();

    let binding = BindingModel::from_view_model(
        before.root(),
        "PageBindingModel",
        "Page",
        &scalars("PageBindingModel"),
    );
    let archive = TopicFactory::create("Archive", "Page", Some(&root)).unwrap();
    let copy = reverse.map_new(&binding, Some(&archive)).await.unwrap();
    let after = forward.map(&copy).await.unwrap();

    for name in ["Key", "Title", "IsFeatured", "Rank"] {
        assert_eq!(after.root().get(name), before.root().get(name), "{name}");
    }
    assert_eq!(after.root().scalar("Rank"), Some(&ScalarValue::Int(3)));
    assert_eq!(copy.get_value("IsFeatured").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_reverse_resolved_target_stays_live() {
    let schema = create_test_schema();
    let store = Arc::new(InMemoryTopicStore::new());
    let repository = TopicRepository::new(store.clone(), schema.clone(), RepositoryConfig::default());
    let root = TopicFactory::create("Root", "Page", None).unwrap();
    TopicFactory::create("B", "Page", Some(&root)).unwrap();
    repository.save(&root, true).await.unwrap();
    store.evict_all();

    let types = StaticTypeLookupService::new().with(
        ModelDescriptor::new("PageBindingModel").with(PropertyDescriptor::key_list("Related")),
    );
    let reverse = ReverseTopicMappingService::new(store.clone(), Arc::new(types), schema);
    let draft = TopicFactory::create("Draft", "Page", None).unwrap();
    let binding = BindingModel::new("PageBindingModel", "Draft", "Page")
        .with("Related", BindingValue::Keys(vec!["Root:B".to_string()]));
    reverse.map(&binding, &draft).await.unwrap();

    let related = draft.relationships().get_values("Related");
    assert_eq!(related.len(), 1);
    let reloaded = repository.load("Root:B").await.unwrap().unwrap();
    assert!(reloaded.ptr_eq(&related[0]));
    assert!(reloaded.incoming_relationships().contains("Related", &draft));
    let loaded_root = repository.load("Root").await.unwrap().unwrap();
    assert!(loaded_root.find_child("B").is_some_and(|b| b.ptr_eq(&related[0])));
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SectionInput {
    key: String,
    title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ArticleInput {
    title: String,
    sections: Vec<SectionInput>,
}

#[tokio::test]
async fn test_config_changes_binding_model_convention() {
    let mut config = Config::default();
    config.mapping.binding_model_suffix = "Form".to_string();
    let types = StaticTypeLookupService::new()
        .with(
            ModelDescriptor::new("PageForm")
                .with(PropertyDescriptor::text("Title"))
                .with(PropertyDescriptor::list("Sections", Some("SectionForm"))),
        )
        .with(ModelDescriptor::new("SectionForm").with(PropertyDescriptor::text("Title")));
    let reverse = ReverseTopicMappingService::new(
        Arc::new(InMemoryTopicStore::new()),
        Arc::new(types),
        ranked_schema(),
    )
    .with_config(&config);
    let page = TopicFactory::create("Page", "Page", None).unwrap();

    let input = ArticleInput {
        title: "Guide".to_string(),
        sections: vec![SectionInput {
            key: "Intro".to_string(),
            title: "Welcome".to_string(),
        }],
    };
    reverse.map_value(&input, &page).await.unwrap();

    assert_eq!(page.get_value("Title").as_deref(), Some("Guide"));
    let intro: Topic = page
        .find_child("Sections")
        .and_then(|list| list.find_child("Intro"))
        .unwrap();
    assert_eq!(intro.content_type(), "Section");
    assert_eq!(intro.get_value("Title").as_deref(), Some("Welcome"));
}

#[tokio::test]
async fn test_unfixed_list_source_follows_requested_associations() {
    let types = || {
        StaticTypeLookupService::new()
            .with(ModelDescriptor::new("PageViewModel").with(PropertyDescriptor::key_list("Sections")))
    };
    let page = TopicFactory::create("Page", "Page", None).unwrap();
    let sections = TopicFactory::create("Sections", "List", Some(&page)).unwrap();
    TopicFactory::create("Intro", "Page", Some(&sections)).unwrap();
    TopicFactory::create("Body", "Page", Some(&sections)).unwrap();

    let graph = mapping_service(types())
        .map_with(&page, AssociationTypes::RELATIONSHIPS)
        .await
        .unwrap();
    assert_eq!(graph.root().get("Sections"), Some(&ModelValue::Keys(Vec::new())));

    let graph = mapping_service(types())
        .map_with(&page, AssociationTypes::MAPPED_COLLECTIONS)
        .await
        .unwrap();
    assert_eq!(
        graph.root().get("Sections"),
        Some(&ModelValue::Keys(vec![
            "Page:Sections:Intro".to_string(),
            "Page:Sections:Body".to_string(),
        ]))
    );
}
