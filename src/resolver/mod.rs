//! Resolution of the file-level import graph and its condensation into an acyclic component
//! graph.
//!
//! The graph is built in three steps. First every tracked file is assigned a dotted module name
//! derived from its repo-relative path and collected into the module-name index. Then each file is
//! scanned for import references, and every reference is resolved against the index by longest
//! prefix match: trailing dotted segments are dropped until a known module remains, which handles
//! imports that target a symbol inside a module as well as subpackages at multiple depths.
//! References that match nothing are external and contribute no edge.
//!
//! Import cycles are collapsed with Tarjan's algorithm into strongly-connected components, giving
//! the acyclic [`CondensedGraph`] the scheduler runs over. Components are opaque ids into parallel
//! arrays of members, weights, critical paths and edges. A component's weight is the byte sum of
//! its files; its critical path is the largest total weight of any dependency chain hanging off it,
//! computed by a reverse-topological sweep.
//!
//! Node order is canonical (files are sorted before ids are assigned), so components, edges and
//! priorities are reproducible across runs on the same input.

use crate::error::{IndexerError, Result};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt, fs,
    path::{Path, PathBuf},
};

pub mod parse;
pub use parse::{ImportRef, SourceImports};

/// Source-language knobs: which files are modules and which file collapses to its directory's
/// module name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLanguage {
    /// File suffixes considered source modules, with the leading dot.
    pub suffixes: Vec<String>,
    /// File stem naming a package initializer.
    pub package_init: String,
}

impl Default for SourceLanguage {
    fn default() -> Self {
        Self { suffixes: vec![".py".to_string()], package_init: "__init__".to_string() }
    }
}

impl SourceLanguage {
    /// Whether the (repo-relative) path names a source module.
    pub fn matches(&self, path: &str) -> bool {
        self.suffixes.iter().any(|suffix| path.ends_with(suffix.as_str()))
    }

    fn strip_suffix<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        self.suffixes.iter().find_map(|suffix| file_name.strip_suffix(suffix.as_str()))
    }
}

/// Derives the dotted module name of `path` relative to `repo_root`.
///
/// Returns `None` if the path is not under the root or does not carry one of the language's
/// suffixes. A package initializer collapses to the containing directory's name.
pub fn module_name(path: &Path, repo_root: &Path, language: &SourceLanguage) -> Option<String> {
    let rel = path.strip_prefix(repo_root).ok()?;
    let mut parts: Vec<String> =
        rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    let file_name = parts.pop()?;
    let stem = language.strip_suffix(&file_name)?;
    if stem != language.package_init {
        parts.push(stem.to_string());
    }
    Some(parts.join("."))
}

/// Identifier of a strongly-connected component; indexes the parallel arrays of
/// [`CondensedGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompId(u32);

impl CompId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// File-level import graph over the tracked files.
///
/// Every input file appears as a node, whether or not it has imports or even parsed; files whose
/// content could not be read keep an empty adjacency and are listed in [`Self::parse_errors`].
#[derive(Clone, Debug)]
pub struct Graph {
    /// Tracked files, sorted; the node id is the index.
    nodes: Vec<PathBuf>,
    /// `edges[n]` holds the nodes `n` imports, deduplicated, ascending.
    edges: Vec<Vec<usize>>,
    /// module name -> node id
    names: BTreeMap<String, usize>,
    /// Files whose content could not be read, with the failure message.
    parse_errors: BTreeMap<PathBuf, String>,
    root: PathBuf,
}

impl Graph {
    /// Builds the import graph over `files`.
    pub fn resolve(
        files: Vec<PathBuf>,
        repo_root: impl AsRef<Path>,
        language: &SourceLanguage,
    ) -> Result<Self> {
        let repo_root = repo_root.as_ref();
        let mut nodes = files;
        nodes.sort();
        nodes.dedup();

        // module-name index; two files must never share a name
        let mut names = BTreeMap::<String, usize>::new();
        let mut name_of = Vec::with_capacity(nodes.len());
        for (id, file) in nodes.iter().enumerate() {
            let name = module_name(file, repo_root, language).ok_or_else(|| {
                IndexerError::msg(format!(
                    "\"{}\" is not a source module under \"{}\"",
                    file.display(),
                    repo_root.display()
                ))
            })?;
            if let Some(&prev) = names.get(&name) {
                return Err(IndexerError::DuplicateModule {
                    name,
                    first: nodes[prev].clone(),
                    second: file.clone(),
                });
            }
            names.insert(name.clone(), id);
            name_of.push(name);
        }

        let mut edges = vec![Vec::new(); nodes.len()];
        let mut parse_errors = BTreeMap::new();
        for (id, file) in nodes.iter().enumerate() {
            let content = match fs::read_to_string(file) {
                Ok(content) => content,
                Err(err) => {
                    debug!("failed reading \"{}\": {err}", file.display());
                    parse_errors.insert(file.clone(), err.to_string());
                    continue;
                }
            };

            let is_init = file
                .file_name()
                .and_then(|f| f.to_str())
                .and_then(|f| language.strip_suffix(f))
                .is_some_and(|stem| stem == language.package_init);
            let package = containing_package(&name_of[id], is_init);

            let mut deps = BTreeSet::new();
            for import in &SourceImports::parse(&content).refs {
                let Some(candidate) = import.candidate(package) else { continue };
                if let Some(dep) = resolve_candidate(&candidate, &names) {
                    if dep != id {
                        deps.insert(dep);
                    }
                }
            }
            edges[id] = deps.into_iter().collect();
        }

        trace!(
            "resolved import graph over {} files, {} unreadable",
            nodes.len(),
            parse_errors.len()
        );
        Ok(Self { nodes, edges, names, parse_errors, root: repo_root.to_path_buf() })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[PathBuf] {
        &self.nodes
    }

    /// The nodes `node` imports.
    pub fn imports_of(&self, node: usize) -> &[usize] {
        &self.edges[node]
    }

    /// Node id of the module with the given dotted name.
    pub fn node_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn parse_errors(&self) -> &BTreeMap<PathBuf, String> {
        &self.parse_errors
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// JSON rendering of the adjacency, keyed and ordered by path (debug aid).
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (id, node) in self.nodes.iter().enumerate() {
            let deps: Vec<serde_json::Value> = self.edges[id]
                .iter()
                .map(|&dep| serde_json::Value::String(self.nodes[dep].display().to_string()))
                .collect();
            map.insert(node.display().to_string(), serde_json::Value::Array(deps));
        }
        serde_json::Value::Object(map)
    }

    /// Collapses import cycles and derives the scheduling metadata.
    pub fn condense(self) -> CondensedGraph {
        CondensedGraph::new(self)
    }
}

fn containing_package(name: &str, is_init: bool) -> &str {
    if is_init {
        name
    } else {
        name.rsplit_once('.').map_or("", |(package, _)| package)
    }
}

/// Longest-prefix match of a dotted candidate against the module-name index: trailing segments
/// are dropped until a known module remains.
fn resolve_candidate(candidate: &str, names: &BTreeMap<String, usize>) -> Option<usize> {
    let parts: Vec<&str> = candidate.split('.').collect();
    for len in (1..=parts.len()).rev() {
        if let Some(&id) = names.get(parts[..len].join(".").as_str()) {
            return Some(id);
        }
    }
    None
}

/// Acyclic component graph with the scheduling metadata attached.
///
/// Components partition the node set; edges follow the import direction (`c` imports `d`), with
/// the transpose kept alongside so the scheduler can release dependents on completion.
#[derive(Clone, Debug)]
pub struct CondensedGraph {
    files: Vec<PathBuf>,
    comp_of: Vec<u32>,
    /// comp -> member node ids, ascending
    members: Vec<Vec<usize>>,
    /// comp -> components it imports
    imports: Vec<Vec<u32>>,
    /// comp -> components importing it
    importers: Vec<Vec<u32>>,
    weight: Vec<u64>,
    cp: Vec<u64>,
    parse_errors: BTreeMap<PathBuf, String>,
    root: PathBuf,
}

impl CondensedGraph {
    fn new(graph: Graph) -> Self {
        let Graph { nodes, edges, parse_errors, root, .. } = graph;
        let (comp_of, count) = tarjan(nodes.len(), &edges);

        let mut members = vec![Vec::new(); count];
        for (node, &comp) in comp_of.iter().enumerate() {
            members[comp as usize].push(node);
        }

        let mut import_sets = vec![BTreeSet::new(); count];
        let mut importer_sets = vec![BTreeSet::new(); count];
        for (u, deps) in edges.iter().enumerate() {
            for &v in deps {
                let (cu, cv) = (comp_of[u], comp_of[v]);
                if cu != cv {
                    import_sets[cu as usize].insert(cv);
                    importer_sets[cv as usize].insert(cu);
                }
            }
        }
        let imports: Vec<Vec<u32>> =
            import_sets.into_iter().map(|set| set.into_iter().collect()).collect();
        let importers: Vec<Vec<u32>> =
            importer_sets.into_iter().map(|set| set.into_iter().collect()).collect();

        let weight: Vec<u64> = members
            .iter()
            .map(|nodes_of| {
                nodes_of
                    .iter()
                    .map(|&node| fs::metadata(&nodes[node]).map(|meta| meta.len()).unwrap_or(1))
                    .sum()
            })
            .collect();

        let cp = critical_paths(&imports, &importers, &weight);

        trace!("condensed {} files into {} components", nodes.len(), count);
        Self {
            files: nodes,
            comp_of,
            members,
            imports,
            importers,
            weight,
            cp,
            parse_errors,
            root,
        }
    }

    /// Component count.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = CompId> {
        (0..self.members.len() as u32).map(CompId)
    }

    /// Files of the component, ascending.
    pub fn members(&self, comp: CompId) -> impl Iterator<Item = &Path> {
        self.members[comp.index()].iter().map(|&node| self.files[node].as_path())
    }

    /// Owned copy of the component's file list, for handing to a task.
    pub fn files_of(&self, comp: CompId) -> Vec<PathBuf> {
        self.members(comp).map(Path::to_path_buf).collect()
    }

    /// The component containing `path`.
    pub fn component_of(&self, path: &Path) -> Option<CompId> {
        let node = self.files.binary_search_by(|file| file.as_path().cmp(path)).ok()?;
        Some(CompId(self.comp_of[node]))
    }

    /// Components `comp` imports (its providers).
    pub fn imports(&self, comp: CompId) -> impl Iterator<Item = CompId> + '_ {
        self.imports[comp.index()].iter().copied().map(CompId)
    }

    /// Components importing `comp` (its consumers).
    pub fn importers(&self, comp: CompId) -> impl Iterator<Item = CompId> + '_ {
        self.importers[comp.index()].iter().copied().map(CompId)
    }

    /// Number of components `comp` imports.
    pub fn import_count(&self, comp: CompId) -> usize {
        self.imports[comp.index()].len()
    }

    /// Byte sum of the component's files.
    pub fn weight(&self, comp: CompId) -> u64 {
        self.weight[comp.index()]
    }

    /// Largest total weight of any dependency chain starting at `comp`, inclusive.
    pub fn critical_path(&self, comp: CompId) -> u64 {
        self.cp[comp.index()]
    }

    /// Deterministic tie-break anchor: the component's smallest file path.
    pub fn anchor(&self, comp: CompId) -> &Path {
        &self.files[self.members[comp.index()][0]]
    }

    pub(crate) fn anchor_id(&self, comp: CompId) -> usize {
        self.members[comp.index()][0]
    }

    pub fn parse_errors(&self) -> &BTreeMap<PathBuf, String> {
        &self.parse_errors
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Iterative Tarjan over nodes in ascending id order; returns the component of every node and the
/// component count. Components are numbered in pop order, so a component's dependencies always
/// carry smaller ids than the component itself.
fn tarjan(n: usize, edges: &[Vec<usize>]) -> (Vec<u32>, usize) {
    const UNVISITED: usize = usize::MAX;

    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut comp_of = vec![0u32; n];
    let mut stack: Vec<usize> = Vec::new();
    // (node, next outgoing edge); the explicit frame stack bounds memory by the longest import
    // chain instead of the thread stack
    let mut frames: Vec<(usize, usize)> = Vec::new();
    let mut next_index = 0usize;
    let mut comp_count = 0usize;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push((root, 0));

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            if frame.1 < edges[v].len() {
                let w = edges[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    frames.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                frames.pop();
                if lowlink[v] == index[v] {
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        comp_of[w] = comp_count as u32;
                        if w == v {
                            break;
                        }
                    }
                    comp_count += 1;
                }
                if let Some(parent) = frames.last_mut() {
                    lowlink[parent.0] = lowlink[parent.0].min(lowlink[v]);
                }
            }
        }
    }

    (comp_of, comp_count)
}

/// Critical paths over the condensed import edges: Kahn toposort seeded with components nothing
/// imports, then a reverse-topological sweep so every component sees its dependencies' final
/// values.
fn critical_paths(imports: &[Vec<u32>], importers: &[Vec<u32>], weight: &[u64]) -> Vec<u64> {
    let count = imports.len();
    let mut indegree: Vec<usize> = importers.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> =
        (0..count).filter(|&comp| indegree[comp] == 0).collect();
    let mut topo = Vec::with_capacity(count);
    while let Some(comp) = queue.pop_front() {
        topo.push(comp);
        for &dep in &imports[comp] {
            indegree[dep as usize] -= 1;
            if indegree[dep as usize] == 0 {
                queue.push_back(dep as usize);
            }
        }
    }
    debug_assert_eq!(topo.len(), count, "condensed graph must be acyclic");

    let mut cp = weight.to_vec();
    for &comp in topo.iter().rev() {
        for &dep in &imports[comp] {
            cp[comp] = cp[comp].max(weight[comp] + cp[dep as usize]);
        }
    }
    cp
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_file(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    /// Writes a file of exactly `size` bytes starting with the given import lines.
    fn write_sized(root: &Path, rel: &str, imports: &[&str], size: usize) -> PathBuf {
        let mut contents = String::new();
        for import in imports {
            contents.push_str(&format!("import {import}\n"));
        }
        assert!(contents.len() <= size, "imports of {rel} exceed target size");
        contents.push_str(&"#".repeat(size - contents.len()));
        write_file(root, rel, &contents)
    }

    fn resolve(root: &Path, files: Vec<PathBuf>) -> Graph {
        Graph::resolve(files, root, &SourceLanguage::default()).unwrap()
    }

    #[test]
    fn module_names_from_paths() {
        let language = SourceLanguage::default();
        let root = Path::new("/repo");
        let name = |rel: &str| module_name(&root.join(rel), root, &language);
        assert_eq!(name("top.py").as_deref(), Some("top"));
        assert_eq!(name("pkg/mod.py").as_deref(), Some("pkg.mod"));
        assert_eq!(name("pkg/sub/__init__.py").as_deref(), Some("pkg.sub"));
        assert_eq!(name("pkg/notes.txt"), None);
        assert_eq!(module_name(Path::new("/elsewhere/x.py"), root, &language), None);
    }

    #[test]
    fn duplicate_module_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a/b.py", "");
        let b = write_file(dir.path(), "a/b/__init__.py", "");
        let err = Graph::resolve(vec![a, b], dir.path(), &SourceLanguage::default()).unwrap_err();
        match err {
            IndexerError::DuplicateModule { name, .. } => assert_eq!(name, "a.b"),
            other => panic!("expected DuplicateModule, got {other:?}"),
        }
    }

    #[test]
    fn resolves_absolute_and_relative_imports() {
        let dir = tempfile::tempdir().unwrap();
        let init = write_file(dir.path(), "pkg/__init__.py", "");
        let a = write_file(dir.path(), "pkg/a.py", "from . import b\nimport os\n");
        let b = write_file(dir.path(), "pkg/b.py", "import pkg\n");
        let graph = resolve(dir.path(), vec![init, a.clone(), b.clone()]);

        let a_id = graph.node_of("pkg.a").unwrap();
        let b_id = graph.node_of("pkg.b").unwrap();
        let init_id = graph.node_of("pkg").unwrap();
        // `import os` is external and dropped
        assert_eq!(graph.imports_of(a_id), &[b_id]);
        assert_eq!(graph.imports_of(b_id), &[init_id]);
        assert_eq!(graph.imports_of(init_id), &[] as &[usize]);
    }

    #[test]
    fn longest_prefix_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let sub = write_file(dir.path(), "pkg/sub/__init__.py", "");
        let helper = write_file(dir.path(), "pkg/sub/mod/helper.py", "");
        let user = write_file(
            dir.path(),
            "user.py",
            "from pkg.sub.mod.helper import Thing\nimport pkg.sub.X\n",
        );
        let graph = resolve(dir.path(), vec![sub, helper, user]);

        let user_id = graph.node_of("user").unwrap();
        let helper_id = graph.node_of("pkg.sub.mod.helper").unwrap();
        let sub_id = graph.node_of("pkg.sub").unwrap();
        // pkg.sub.mod.helper.Thing -> pkg.sub.mod.helper; pkg.sub.X -> pkg.sub
        assert_eq!(graph.imports_of(user_id), &[sub_id, helper_id]);
    }

    #[test]
    fn star_imports_contribute_no_edge() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.py", "from b import *\n");
        let b = write_file(dir.path(), "b.py", "");
        let graph = resolve(dir.path(), vec![a, b]);
        let a_id = graph.node_of("a").unwrap();
        assert_eq!(graph.imports_of(a_id), &[] as &[usize]);
    }

    #[test]
    fn self_imports_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.py", "import a\n");
        let graph = resolve(dir.path(), vec![a]);
        assert_eq!(graph.imports_of(0), &[] as &[usize]);
    }

    #[test]
    fn unreadable_file_keeps_its_node() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.py", "import missing_on_disk\n");
        let ghost = dir.path().join("missing_on_disk.py");
        let graph = resolve(dir.path(), vec![a, ghost.clone()]);

        assert_eq!(graph.len(), 2);
        assert!(graph.parse_errors().contains_key(&ghost));
        // the unreadable file still resolves as an import target
        let a_id = graph.node_of("a").unwrap();
        let ghost_id = graph.node_of("missing_on_disk").unwrap();
        assert_eq!(graph.imports_of(a_id), &[ghost_id]);

        // and its unobtainable size defaults to 1, never 0
        let condensed = graph.condense();
        let comp = condensed.component_of(&ghost).unwrap();
        assert_eq!(condensed.weight(comp), 1);
    }

    #[test]
    fn cycle_collapses_into_one_component() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.py", "import b\n");
        let b = write_file(dir.path(), "b.py", "import a\n");
        let lone = write_file(dir.path(), "lone.py", "");
        let condensed = resolve(dir.path(), vec![a.clone(), b.clone(), lone.clone()]).condense();

        assert_eq!(condensed.len(), 2);
        let pair = condensed.component_of(&a).unwrap();
        assert_eq!(condensed.component_of(&b), Some(pair));
        assert_ne!(condensed.component_of(&lone), Some(pair));
        assert_eq!(condensed.files_of(pair), vec![a, b]);
        // no self-loops survive condensation
        assert_eq!(condensed.imports(pair).count(), 0);
        assert_eq!(condensed.importers(pair).count(), 0);
    }

    #[test]
    fn components_partition_the_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(dir.path(), "a.py", "import b\nimport c\n"),
            write_file(dir.path(), "b.py", "import a\n"),
            write_file(dir.path(), "c.py", "import d\n"),
            write_file(dir.path(), "d.py", ""),
        ];
        let condensed = resolve(dir.path(), files.clone()).condense();

        let mut seen = 0usize;
        for comp in condensed.components() {
            for member in condensed.members(comp) {
                assert_eq!(condensed.component_of(member), Some(comp));
                seen += 1;
            }
        }
        assert_eq!(seen, files.len());
    }

    #[test]
    fn chain_critical_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sized(dir.path(), "a.py", &["b"], 100);
        let b = write_sized(dir.path(), "b.py", &["c"], 200);
        let c = write_sized(dir.path(), "c.py", &[], 300);
        let condensed = resolve(dir.path(), vec![a.clone(), b.clone(), c.clone()]).condense();

        let comp = |path| condensed.component_of(path).unwrap();
        assert_eq!(condensed.critical_path(comp(&c)), 300);
        assert_eq!(condensed.critical_path(comp(&b)), 500);
        assert_eq!(condensed.critical_path(comp(&a)), 600);
        assert_eq!(condensed.weight(comp(&a)), 100);
    }

    #[test]
    fn diamond_critical_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sized(dir.path(), "a.py", &["b", "c"], 100);
        let b = write_sized(dir.path(), "b.py", &["d"], 100);
        let c = write_sized(dir.path(), "c.py", &["d"], 100);
        let d = write_sized(dir.path(), "d.py", &[], 100);
        let condensed =
            resolve(dir.path(), vec![a.clone(), b.clone(), c.clone(), d.clone()]).condense();

        let comp = |path| condensed.component_of(path).unwrap();
        assert_eq!(condensed.critical_path(comp(&d)), 100);
        assert_eq!(condensed.critical_path(comp(&b)), 200);
        assert_eq!(condensed.critical_path(comp(&c)), 200);
        assert_eq!(condensed.critical_path(comp(&a)), 300);
        // only the shared leaf has no dependencies
        let ready: Vec<_> =
            condensed.components().filter(|&comp| condensed.import_count(comp) == 0).collect();
        assert_eq!(ready, vec![comp(&d)]);
    }

    #[test]
    fn condensed_edges_follow_file_edges() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.py", "import b\n");
        let b = write_file(dir.path(), "b.py", "import a\nimport c\n");
        let c = write_file(dir.path(), "c.py", "");
        let condensed = resolve(dir.path(), vec![a.clone(), b, c.clone()]).condense();

        let pair = condensed.component_of(&a).unwrap();
        let leaf = condensed.component_of(&c).unwrap();
        assert_eq!(condensed.imports(pair).collect::<Vec<_>>(), vec![leaf]);
        assert_eq!(condensed.importers(leaf).collect::<Vec<_>>(), vec![pair]);
        assert_eq!(condensed.import_count(leaf), 0);
    }

    #[test]
    fn resolution_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(dir.path(), "a.py", "import b\nimport d\n"),
            write_file(dir.path(), "b.py", "import c\n"),
            write_file(dir.path(), "c.py", "import b\n"),
            write_file(dir.path(), "d.py", ""),
        ];
        let first = resolve(dir.path(), files.clone());
        let second = resolve(dir.path(), files);
        assert_eq!(first.to_json(), second.to_json());

        let (first, second) = (first.condense(), second.condense());
        assert_eq!(first.len(), second.len());
        for comp in first.components() {
            assert_eq!(first.files_of(comp), second.files_of(comp));
            assert_eq!(first.critical_path(comp), second.critical_path(comp));
        }
    }
}
