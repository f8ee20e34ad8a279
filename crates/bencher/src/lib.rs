/// A route of the benchmark table: method, pattern and the handler it binds to.
#[derive(Debug, Copy, Clone)]
pub struct RouteDef {
    method: &'static str,
    pattern: &'static str,
    handler: &'static str,
}

impl RouteDef {
    pub const fn new(method: &'static str, pattern: &'static str, handler: &'static str) -> Self {
        Self { method, pattern, handler }
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    pub fn handler(&self) -> &'static str {
        self.handler
    }
}

/// Registration order matters: narrow routes come before the catch-alls.
pub static ROUTES: &[RouteDef] = &[
    RouteDef::new("GET", "/", "index"),
    RouteDef::new("GET", "/about", "about"),
    RouteDef::new("GET", "/robots.txt", "robots"),
    RouteDef::new("GET", "/user/{id}", "user"),
    RouteDef::new("POST", "/user/{id}", "update_user"),
    RouteDef::new("GET", "/user/{id}/{email}/dashboard", "dashboard"),
    RouteDef::new("GET", "/org/{org}/repo/{repo}/issues/{number: [0-9]+}", "issue"),
    RouteDef::new("GET", "/org/{org}/repo/{repo}/pulls", "pulls"),
    RouteDef::new("GET", "/search", "search"),
    RouteDef::new("GET", "/assets/favicon.ico", "favicon"),
    RouteDef::new("GET", "/assets/{file: .*}", "asset"),
    RouteDef::new("GET", "/.*", "fallback"),
];

/// Every handler name used by [`ROUTES`].
pub fn handler_names() -> impl Iterator<Item = &'static str> {
    ROUTES.iter().map(RouteDef::handler)
}

#[derive(Debug, Copy, Clone)]
pub struct LookupCase {
    name: &'static str,
    group: CaseGroup,
    method: &'static str,
    path: &'static str,
}

impl LookupCase {
    pub const fn new(name: &'static str, group: CaseGroup, method: &'static str, path: &'static str) -> Self {
        Self { name, group, method, path }
    }

    pub const fn early(name: &'static str, method: &'static str, path: &'static str) -> Self {
        Self::new(name, CaseGroup::Early, method, path)
    }

    pub const fn late(name: &'static str, method: &'static str, path: &'static str) -> Self {
        Self::new(name, CaseGroup::Late, method, path)
    }

    pub const fn miss(name: &'static str, method: &'static str, path: &'static str) -> Self {
        Self::new(name, CaseGroup::Miss, method, path)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> CaseGroup {
        self.group
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn path(&self) -> &'static str {
        self.path
    }
}

/// Where in the table the matching route sits.
#[derive(Clone, Copy, Debug)]
pub enum CaseGroup {
    Early,
    Late,
    Miss,
}

pub static LOOKUPS: &[LookupCase] = &[
    LookupCase::early("exact_root", "GET", "/"),
    LookupCase::early("single_param", "GET", "/user/42"),
    LookupCase::late("regex_param", "GET", "/org/acme/repo/dispatch/issues/1234"),
    LookupCase::late("catch_all_asset", "GET", "/assets/css/site/app.css"),
    LookupCase::late("fallback", "GET", "/nothing/else/matches"),
    LookupCase::miss("method_miss", "DELETE", "/user/42"),
];
