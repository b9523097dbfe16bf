//! Suspending-mode rendering tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use obi_templates::{
    compile, PartialResolver, RenderContext, RenderError, RenderMode,
    SuspendingPartialResolver, Template,
};

struct AsyncResolver {
    templates: HashMap<String, Arc<Template>>,
    resolved: Mutex<Vec<String>>,
}

impl AsyncResolver {
    fn new(partials: &[(&str, &str)]) -> Self {
        let mut templates = HashMap::new();
        for (name, src) in partials {
            let tpl = compile(src, RenderMode::Suspending).expect("partial compile failed");
            templates.insert(name.to_string(), Arc::new(tpl));
        }
        AsyncResolver {
            templates,
            resolved: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SuspendingPartialResolver for AsyncResolver {
    async fn resolve(&self, name: &str) -> Result<Arc<Template>, RenderError> {
        // force an actual suspension point
        tokio::task::yield_now().await;
        self.resolved.lock().unwrap().push(name.to_string());
        self.templates.get(name).cloned().ok_or_else(|| RenderError::PartialNotFound {
            name: name.to_string(),
        })
    }
}

struct SyncResolver(HashMap<String, Arc<Template>>);

impl PartialResolver for SyncResolver {
    fn resolve(&self, name: &str) -> Result<Arc<Template>, RenderError> {
        self.0.get(name).cloned().ok_or_else(|| RenderError::PartialNotFound {
            name: name.to_string(),
        })
    }
}

async fn render(src: &str, mut model: Value, ctx: &RenderContext) -> String {
    let tpl = compile(src, RenderMode::Suspending).expect("compile failed");
    tpl.render_suspending(&mut model, ctx).await.expect("render failed")
}

#[tokio::test]
async fn suspending_output_matches_direct_semantics() {
    let src = "{{#each x in model.list}}{{scope.index}}:{{x}};{{/each}}{{#if model.flag}}Y{{else}}N{{/if}}";
    let model = json!({"list": ["a", "b"], "flag": false});
    let out = render(src, model, &RenderContext::new()).await;
    assert_eq!(out, "0:a;1:b;N");
}

#[tokio::test]
async fn capture_works_across_suspension_points() {
    let src = "{{#capture model.head}}T: {{model.title}}{{/capture}}[{{model.head}}]";
    let out = render(src, json!({"title": "Hi"}), &RenderContext::new()).await;
    assert_eq!(out, "[T: Hi]");
}

#[tokio::test]
async fn partials_resolve_through_the_suspending_resolver() {
    let resolver = Arc::new(AsyncResolver::new(&[("user", "{{model.name}}")]));
    let ctx = RenderContext::new().with_suspending_partials(resolver.clone());
    let model = json!({"users": [{"name": "a"}, {"name": "b"}]});
    let out = render("{{#each u in model.users}}{{> 'user'}}{{/each}}", model, &ctx).await;
    assert_eq!(out, "ab");
    assert_eq!(*resolver.resolved.lock().unwrap(), vec!["user", "user"]);
}

#[tokio::test]
async fn partials_resolve_in_document_order() {
    let resolver = Arc::new(AsyncResolver::new(&[("a", "A"), ("b", "B"), ("c", "C")]));
    let ctx = RenderContext::new().with_suspending_partials(resolver.clone());
    let out = render("{{> 'a'}}-{{> 'b'}}-{{> 'c'}}", json!({}), &ctx).await;
    assert_eq!(out, "A-B-C");
    assert_eq!(*resolver.resolved.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn nested_suspending_partials() {
    let resolver = Arc::new(AsyncResolver::new(&[
        ("outer", "({{> 'inner'}})"),
        ("inner", "{{model.name}}"),
    ]));
    let ctx = RenderContext::new().with_suspending_partials(resolver);
    let out = render("{{> 'outer'}}", json!({"name": "n"}), &ctx).await;
    assert_eq!(out, "(n)");
}

#[tokio::test]
async fn falls_back_to_the_direct_resolver() {
    let mut templates = HashMap::new();
    let tpl = compile("{{model.name}}", RenderMode::Suspending).expect("compile failed");
    templates.insert("user".to_string(), Arc::new(tpl));
    let ctx = RenderContext::new().with_partials(Arc::new(SyncResolver(templates)));
    let out = render("{{> 'user'}}", json!({"name": "n"}), &ctx).await;
    assert_eq!(out, "n");
}

#[tokio::test]
async fn captures_inside_inherited_partials_reach_the_caller() {
    let resolver = Arc::new(AsyncResolver::new(&[("p", "{{#capture model.x}}V{{/capture}}")]));
    let ctx = RenderContext::new().with_suspending_partials(resolver);
    let out = render("{{> 'p'}}{{model.x}}", json!({}), &ctx).await;
    assert_eq!(out, "V");
}

#[tokio::test]
async fn partial_without_any_resolver_fails() {
    let tpl = compile("{{> 'x'}}", RenderMode::Suspending).expect("compile failed");
    let mut model = json!({});
    let err = tpl
        .render_suspending(&mut model, &RenderContext::new())
        .await
        .expect_err("expected an error");
    assert!(matches!(err, RenderError::NoPartialResolver { .. }));
}

#[tokio::test]
async fn direct_templates_reject_suspending_rendering() {
    let tpl = compile("x", RenderMode::Direct).expect("compile failed");
    let mut model = json!({});
    let err = tpl
        .render_suspending(&mut model, &RenderContext::new())
        .await
        .expect_err("expected an error");
    assert!(matches!(
        err,
        RenderError::ModeMismatch { compiled: RenderMode::Direct, requested: RenderMode::Suspending }
    ));
}
