use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use log::info;
use mirc_backend::cfg::CfgGraph;
use mirc_backend::Allocation;
use mirc_common::mir::pretty::Prettier;
use mirc_common::mir::MirList;
use mirc_common::symbols::SymbolTable;

/// Write one Graphviz file per control flow graph and one for the
/// interference graph into `dir`.
pub fn dump(
    dir: &Path,
    mir: &MirList,
    symbols: &SymbolTable,
    allocation: &Allocation,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("could not create '{}'", dir.display()))?;

    let prettier = Prettier::new(symbols);

    for graph in allocation.graphs.iter() {
        let path = dir.join(format!("cfg_{}.dot", graph.index));
        let mut writer = create(&path)?;
        GraphViz::control_flow(graph, mir, &prettier).render(&mut writer)?;
    }

    let path = dir.join("ig.dot");
    let mut writer = create(&path)?;
    GraphViz::interference(allocation, symbols).render(&mut writer)?;

    info!("wrote graphs to '{}'", dir.display());
    Ok(())
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("could not create '{}'", path.display()))?;
    Ok(BufWriter::new(file))
}

struct GraphViz {
    name: String,
    labels: Vec<String>,
    edges: Vec<(usize, usize)>,
}

impl GraphViz {
    fn control_flow<'a>(graph: &CfgGraph, mir: &MirList, prettier: &'a Prettier<'a>) -> Self {
        let labels = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                format!("{index}: {}", prettier.pretty_instr(mir.instr(node.instr)))
            })
            .collect();

        let edges = graph
            .nodes
            .iter()
            .enumerate()
            .flat_map(|(from, node)| node.succs.iter().map(move |to| (from, to.0)))
            .collect();

        Self {
            name: format!("cfg{}", graph.index),
            labels,
            edges,
        }
    }

    /// Each interference is written once, from the lower vertex to the higher.
    fn interference(allocation: &Allocation, symbols: &SymbolTable) -> Self {
        let ig = &allocation.interference;

        let labels = ig
            .vertices()
            .iter()
            .map(|reg| match allocation.register(reg) {
                Some(register) => format!("{} ${register}", reg.describe(symbols)),
                None => reg.describe(symbols).to_string(),
            })
            .collect();

        let edges = (0..ig.len())
            .flat_map(|a| {
                ig.neighbours(a)
                    .iter()
                    .filter(move |b| a < **b)
                    .map(move |b| (a, *b))
            })
            .collect();

        Self {
            name: "interference".into(),
            labels,
            edges,
        }
    }

    pub fn render<W: std::io::Write>(&self, output: &mut W) -> dot2::Result {
        dot2::render(self, output)
    }
}

impl<'a> dot2::Labeller<'a> for GraphViz {
    type Node = usize;
    type Edge = (usize, usize);
    type Subgraph = ();

    fn graph_id(&'a self) -> dot2::Result<dot2::Id<'a>> {
        dot2::Id::new(self.name.as_str())
    }

    fn node_id(&'a self, n: &Self::Node) -> dot2::Result<dot2::Id<'a>> {
        dot2::Id::new(format!("N{n}"))
    }

    fn node_label(&'a self, n: &Self::Node) -> dot2::Result<dot2::label::Text<'a>> {
        Ok(dot2::label::Text::LabelStr(self.labels[*n].as_str().into()))
    }
}

impl<'a> dot2::GraphWalk<'a> for GraphViz {
    type Node = usize;
    type Edge = (usize, usize);
    type Subgraph = ();

    fn nodes(&'a self) -> dot2::Nodes<'a, Self::Node> {
        (0..self.labels.len()).collect()
    }

    fn edges(&'a self) -> dot2::Edges<'a, Self::Edge> {
        (&self.edges[..]).into()
    }

    fn source(&'a self, edge: &Self::Edge) -> Self::Node {
        edge.0
    }

    fn target(&'a self, edge: &Self::Edge) -> Self::Node {
        edge.1
    }
}
