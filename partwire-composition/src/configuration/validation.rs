use crate::configuration::{ComposedPart, SatisfiedImport};
use crate::contract::TypeRef;
use crate::error::CompositionDiagnostic;
use crate::import_definition::{ImportCollection, ImportSite, ImportWrapper};
use crate::part_definition::ComposablePartDefinition;
use fxhash::FxHashMap;
use itertools::Itertools;
use std::collections::BTreeSet;

/// Checks cardinality, assignability and collection type of a single import.
pub(super) fn check_import(
    part: &TypeRef,
    satisfied: &SatisfiedImport,
) -> Vec<CompositionDiagnostic> {
    let import = &satisfied.import;
    let definition = import.definition();
    let mut diagnostics = vec![];

    if !definition
        .cardinality()
        .is_satisfied_by_count(satisfied.exports.len())
    {
        diagnostics.push(CompositionDiagnostic::CardinalityMismatch {
            part: part.clone(),
            import: import.site().to_string(),
            contract: definition.contract().clone(),
            cardinality: definition.cardinality(),
            actual: satisfied.exports.len(),
        });
    }

    diagnostics.extend(
        satisfied
            .exports
            .iter()
            .filter(|export| !export.export().is_assignable_to(import.element_type()))
            .map(|export| CompositionDiagnostic::NotAssignable {
                part: part.clone(),
                import: import.site().to_string(),
                exporting_part: export.part().type_ref().clone(),
                contract: export.definition().contract().clone(),
                expected: import.element_type().clone(),
            }),
    );

    if let Some(ImportCollection::Custom { type_ref, adapter }) = import.collection() {
        let supported = match import.site() {
            ImportSite::ConstructorParameter { .. } => false,
            ImportSite::Member(_) => adapter.is_some(),
        };

        if !supported {
            diagnostics.push(CompositionDiagnostic::UnsupportedImportCollection {
                part: part.clone(),
                import: import.site().to_string(),
                collection: type_ref.clone(),
            });
        }
    }

    diagnostics
}

fn part_indices(parts: &[ComposedPart]) -> FxHashMap<&TypeRef, usize> {
    parts
        .iter()
        .enumerate()
        .map(|(index, part)| (part.definition.type_ref(), index))
        .collect()
}

/// Propagates required sharing boundaries along imports, until nothing changes. Boundaries
/// declared by export factory imports are owned by scopes created by the factory, so they are
/// not propagated past it.
pub(super) fn propagate_sharing_boundaries(parts: &mut [ComposedPart]) {
    let dependencies = {
        let indices = part_indices(parts);
        parts
            .iter()
            .map(|part| {
                part.satisfied_imports
                    .iter()
                    .flat_map(|satisfied| {
                        let excluded = if satisfied.import.is_export_factory() {
                            satisfied
                                .import
                                .definition()
                                .export_factory_sharing_boundaries()
                                .to_vec()
                        } else {
                            vec![]
                        };

                        satisfied
                            .exports
                            .iter()
                            .filter_map(|export| indices.get(export.part().type_ref()).copied())
                            .map(move |index| (index, excluded.clone()))
                            .collect_vec()
                    })
                    .collect_vec()
            })
            .collect_vec()
    };

    let mut changed = true;
    while changed {
        changed = false;

        for (index, part_dependencies) in dependencies.iter().enumerate() {
            let inherited: BTreeSet<String> = part_dependencies
                .iter()
                .flat_map(|(dependency, excluded)| {
                    parts[*dependency]
                        .required_sharing_boundaries
                        .iter()
                        .filter(|boundary| !excluded.contains(*boundary))
                        .cloned()
                        .collect_vec()
                })
                .collect();

            let required = &mut parts[index].required_sharing_boundaries;
            for boundary in inherited {
                changed |= required.insert(boundary);
            }
        }
    }
}

struct Edge {
    target: usize,
    constructor: bool,
    requires_non_shared: bool,
}

/// Builds the graph of imports satisfied while creating a part. Lazy and export factory imports
/// are deferred, so they don't participate.
fn instantiation_graph(parts: &[ComposedPart]) -> Vec<Vec<Edge>> {
    let indices = part_indices(parts);

    parts
        .iter()
        .map(|part| {
            part.satisfied_imports
                .iter()
                .filter(|satisfied| *satisfied.import.wrapper() == ImportWrapper::Direct)
                .flat_map(|satisfied| {
                    satisfied.exports.iter().filter_map(|export| {
                        indices.get(export.part().type_ref()).map(|target| Edge {
                            target: *target,
                            constructor: satisfied.import.is_constructor_parameter(),
                            requires_non_shared: satisfied
                                .import
                                .is_non_shared_instance_required(export.part()),
                        })
                    })
                })
                .collect()
        })
        .collect()
}

/// Tarjan's strongly connected components, with an explicit stack instead of recursion.
struct Tarjan<'a> {
    graph: &'a [Vec<Edge>],
    index: usize,
    indices: Vec<Option<usize>>,
    low_links: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl<'a> Tarjan<'a> {
    fn new(graph: &'a [Vec<Edge>]) -> Self {
        Self {
            graph,
            index: 0,
            indices: vec![None; graph.len()],
            low_links: vec![0; graph.len()],
            on_stack: vec![false; graph.len()],
            stack: vec![],
            components: vec![],
        }
    }

    fn run(mut self) -> Vec<Vec<usize>> {
        for node in 0..self.graph.len() {
            if self.indices[node].is_none() {
                self.connect(node);
            }
        }

        self.components
    }

    fn visit(&mut self, node: usize) {
        self.indices[node] = Some(self.index);
        self.low_links[node] = self.index;
        self.index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;
    }

    fn connect(&mut self, root: usize) {
        let graph = self.graph;

        // (node, next edge to follow)
        let mut calls = vec![(root, 0)];
        self.visit(root);

        while let Some((node, edge)) = calls.pop() {
            if let Some(Edge { target, .. }) = graph[node].get(edge) {
                let target = *target;
                calls.push((node, edge + 1));

                match self.indices[target] {
                    None => {
                        self.visit(target);
                        calls.push((target, 0));
                    }
                    Some(index) if self.on_stack[target] => {
                        self.low_links[node] = self.low_links[node].min(index);
                    }
                    _ => {}
                }

                continue;
            }

            if let Some((caller, _)) = calls.last() {
                self.low_links[*caller] = self.low_links[*caller].min(self.low_links[node]);
            }

            if Some(self.low_links[node]) == self.indices[node] {
                let mut component = vec![];
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member] = false;
                    component.push(member);

                    if member == node {
                        break;
                    }
                }

                component.sort_unstable();
                self.components.push(component);
            }
        }
    }
}

fn is_non_shared(part: &ComposablePartDefinition) -> bool {
    !part.is_shared()
}

/// Finds import cycles which cannot be resolved at runtime. Returns diagnostics along with
/// indices of parts they belong to - one diagnostic per cycle, attached to its first part.
///
/// A shared part becomes visible as a provisional instance only after its constructor returns.
/// A cycle is therefore resolvable only if every import on it is an importing member of a
/// shared part, which doesn't require a new instance. Any constructor import on a cycle fails
/// when its part is requested first.
pub(super) fn find_cycles(parts: &[ComposedPart]) -> Vec<(usize, CompositionDiagnostic)> {
    let graph = instantiation_graph(parts);

    let internal_edges = |component: &[usize]| {
        component
            .iter()
            .flat_map(|node| {
                graph[*node]
                    .iter()
                    .filter(|edge| component.contains(&edge.target))
                    .map(move |edge| (*node, edge))
            })
            .collect_vec()
    };

    Tarjan::new(&graph)
        .run()
        .into_iter()
        .filter_map(|component| {
            let edges = internal_edges(&component);

            let unresolvable = edges.iter().any(|(node, edge)| {
                edge.constructor
                    || edge.requires_non_shared
                    || is_non_shared(&parts[*node].definition)
            });

            if !unresolvable {
                return None;
            }

            let non_shared = component
                .iter()
                .any(|node| is_non_shared(&parts[*node].definition))
                || edges.iter().any(|(_, edge)| edge.requires_non_shared);

            let first = component[0];
            let part = parts[first].definition.type_ref().clone();
            let cycle = component
                .iter()
                .chain(std::iter::once(&first))
                .map(|node| parts[*node].definition.type_ref().clone())
                .collect_vec();

            let diagnostic = if non_shared {
                CompositionDiagnostic::NonSharedCycle { part, cycle }
            } else {
                CompositionDiagnostic::ConstructorCycle { part, cycle }
            };

            Some((first, diagnostic))
        })
        .sorted_by_key(|(first, _)| *first)
        .collect()
}
