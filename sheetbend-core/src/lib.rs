pub mod tolerance {
    /// 几何判定使用的绝对容差，与线段长度相除得到相对容差。
    pub const EPSILON: f64 = 1e-6;

    #[inline]
    pub fn is_zero(value: f64, epsilon: f64) -> bool {
        value.abs() <= epsilon
    }

    #[inline]
    pub fn is_equal(a: f64, b: f64, epsilon: f64) -> bool {
        is_zero(a - b, epsilon)
    }

}

pub mod geometry {
    use std::cmp::Ordering;

    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    use crate::tolerance::{self, EPSILON};

    /// 二维点，内部以 `glam::DVec2` 表示。相等判定为逐字段精确比较，不带容差。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn distance_to(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 从 `other` 指向当前点的方向角（弧度，范围 (-π, π]）。
        #[inline]
        pub fn angle_to(self, other: Point2) -> f64 {
            let delta = self.0 - other.0;
            delta.y.atan2(delta.x)
        }

        /// 返回当前点在有限线段 a-b 上的“位置参数”（lie）。
        ///
        /// 点位于 a 时为 0，位于 b 时为 1，中点为 0.5；小于 0 或大于 1 表示投影落在线段之外。
        /// 计算沿线段跨度较大的坐标轴进行，零长度线段返回 0。
        pub fn lie_on(self, a: Point2, b: Point2) -> f64 {
            let dx = b.x() - a.x();
            let dy = b.y() - a.y();
            if dx.abs() > dy.abs() {
                (self.x() - a.x()) / dx
            } else if dy == 0.0 {
                0.0
            } else {
                (self.y() - a.y()) / dy
            }
        }

        /// 判定点是否位于线段所在的无限延长线上（垂距不超过 `EPSILON`）。
        pub fn lies_on_infinite_line(self, segment: &Segment) -> bool {
            let direction = segment.end().0 - segment.start().0;
            let length = direction.length();
            if length == 0.0 {
                return self == segment.start();
            }
            let cross = direction.perp_dot(self.0 - segment.start().0);
            tolerance::is_zero(cross / length, EPSILON)
        }

        /// 先比较 x，再比较 y 的字典序。
        #[inline]
        pub fn lexicographic_cmp(self, other: Point2) -> Ordering {
            match self.x().partial_cmp(&other.x()) {
                Some(Ordering::Equal) | None => self
                    .y()
                    .partial_cmp(&other.y())
                    .unwrap_or(Ordering::Equal),
                Some(ordering) => ordering,
            }
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    #[inline]
    pub fn distance(a: Point2, b: Point2) -> f64 {
        a.distance_to(b)
    }

    /// 斜率保留一位小数；竖直线单独标记，不做除零。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub enum Slope {
        Finite(f64),
        Vertical,
    }

    /// 相交测试的结果。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Intersection {
        Point(Point2),
        Colinear,
        Disjoint,
    }

    impl Intersection {
        #[inline]
        pub fn point(self) -> Option<Point2> {
            match self {
                Intersection::Point(point) => Some(point),
                _ => None,
            }
        }

        #[inline]
        pub fn is_disjoint(self) -> bool {
            matches!(self, Intersection::Disjoint)
        }
    }

    /// 线段。构造时按字典序规范化端点，较小的点总在 `start`，
    /// 因此同一组无序端点构造出的线段相等。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Segment {
        start: Point2,
        end: Point2,
    }

    impl Segment {
        pub fn new(a: Point2, b: Point2) -> Self {
            if b.lexicographic_cmp(a) == Ordering::Less {
                Self { start: b, end: a }
            } else {
                Self { start: a, end: b }
            }
        }

        #[inline]
        pub fn start(&self) -> Point2 {
            self.start
        }

        #[inline]
        pub fn end(&self) -> Point2 {
            self.end
        }

        #[inline]
        pub fn length(&self) -> f64 {
            self.start.distance_to(self.end)
        }

        /// 零长度线段不得参与相交测试。
        #[inline]
        pub fn is_degenerate(&self) -> bool {
            self.start == self.end
        }

        pub fn slope(&self) -> Slope {
            let dx = self.end.x() - self.start.x();
            let dy = self.end.y() - self.start.y();
            if dx == 0.0 {
                Slope::Vertical
            } else {
                Slope::Finite((dy / dx * 10.0).round() / 10.0)
            }
        }

        /// 求两条无限延长线的交点。
        ///
        /// 由两组端点分别建立一般式 `A·X + B·Y = C`，用克莱姆法则求解。
        /// 行列式恰为 0 时两线平行：若斜率相同且 `other` 至少有一个端点落在本线的延长线上，
        /// 返回 [`Intersection::Colinear`]，否则返回 [`Intersection::Disjoint`]。
        ///
        /// 退化（零长度）线段应由调用方事先排除；此处仅做防护，直接返回 `Disjoint`。
        pub fn intersects_infinite_at(&self, other: &Segment) -> Intersection {
            if self.is_degenerate() || other.is_degenerate() {
                return Intersection::Disjoint;
            }
            let (a1, b1, c1) = self.general_form();
            let (a2, b2, c2) = other.general_form();
            let det = a1 * b2 - a2 * b1;
            if det == 0.0 {
                return if self.is_colinear_segment(other) {
                    Intersection::Colinear
                } else {
                    Intersection::Disjoint
                };
            }
            Intersection::Point(Point2::new(
                (c1 * b2 - c2 * b1) / det,
                (a1 * c2 - a2 * c1) / det,
            ))
        }

        /// 有限线段相交测试：交点在两条线段上的 lie 都必须落在 `[-δ, 1+δ]`，
        /// 其中 `δ = EPSILON / 线段长度`。共线时仅在两段范围重叠时返回 `Colinear`。
        pub fn intersects_segment_at(&self, other: &Segment) -> Intersection {
            match self.intersects_infinite_at(other) {
                Intersection::Point(point) => {
                    if other.contains_lie(point) && self.contains_lie(point) {
                        Intersection::Point(point)
                    } else {
                        Intersection::Disjoint
                    }
                }
                Intersection::Colinear => {
                    if self.overlaps_colinear(other) {
                        Intersection::Colinear
                    } else {
                        Intersection::Disjoint
                    }
                }
                Intersection::Disjoint => Intersection::Disjoint,
            }
        }

        pub fn is_colinear_segment(&self, other: &Segment) -> bool {
            self.slope() == other.slope()
                && (other.start.lies_on_infinite_line(self) || other.end.lies_on_infinite_line(self))
        }

        fn overlaps_colinear(&self, other: &Segment) -> bool {
            let delta = self.lie_delta();
            let t0 = other.start.lie_on(self.start, self.end);
            let t1 = other.end.lie_on(self.start, self.end);
            t0.max(t1) >= -delta && t0.min(t1) <= 1.0 + delta
        }

        fn contains_lie(&self, point: Point2) -> bool {
            let lie = point.lie_on(self.start, self.end);
            let delta = self.lie_delta();
            lie >= -delta && lie <= 1.0 + delta
        }

        fn lie_delta(&self) -> f64 {
            let length = self.length();
            if length == 0.0 { 0.0 } else { EPSILON / length }
        }

        fn general_form(&self) -> (f64, f64, f64) {
            let (s, e) = (self.start, self.end);
            let a = s.y() - e.y();
            let b = e.x() - s.x();
            let c = e.x() * s.y() - s.x() * e.y();
            (a, b, c)
        }
    }

    /// 折弯线：线段加折弯扣除量、折弯半径与折弯角度。
    ///
    /// 几何行为全部委托给 [`Segment`]；三个属性只在文件往返时携带，不参与几何判定。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct BendLine {
        pub segment: Segment,
        pub deduction: f64,
        pub radius: f64,
        pub angle: f64,
    }

    impl BendLine {
        pub fn new(start: Point2, end: Point2, deduction: f64, radius: f64, angle: f64) -> Self {
            Self {
                segment: Segment::new(start, end),
                deduction,
                radius,
                angle,
            }
        }

        #[inline]
        pub fn start(&self) -> Point2 {
            self.segment.start()
        }

        #[inline]
        pub fn end(&self) -> Point2 {
            self.segment.end()
        }

        #[inline]
        pub fn segment(&self) -> &Segment {
            &self.segment
        }
    }

    /// 轴对齐边界框。空框以 +∞/-∞ 作为哨兵，合并时自然消失。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        /// 由任意两个对角点构造。
        pub fn from_corners(a: Point2, b: Point2) -> Self {
            Self {
                min: Point2::from_vec(a.as_vec2().min(b.as_vec2())),
                max: Point2::from_vec(a.as_vec2().max(b.as_vec2())),
            }
        }

        pub fn from_points<I>(points: I) -> Self
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(point);
            }
            bounds
        }

        pub fn union<'a, I>(bounds: I) -> Self
        where
            I: IntoIterator<Item = &'a Bounds2D>,
        {
            let mut result = Self::empty();
            for other in bounds {
                result.include_bounds(other);
            }
            result
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn min_x(&self) -> f64 {
            self.min.x()
        }

        #[inline]
        pub fn max_x(&self) -> f64 {
            self.max.x()
        }

        #[inline]
        pub fn min_y(&self) -> f64 {
            self.min.y()
        }

        #[inline]
        pub fn max_y(&self) -> f64 {
            self.max.y()
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }

        /// 以 `pivot` 为中心，将各方向的半跨度乘以 `factor`（用于缩放视图）。空框原样返回。
        pub fn inflated(&self, pivot: Point2, factor: f64) -> Self {
            if self.is_empty() {
                return *self;
            }
            Self {
                min: Point2::new(
                    pivot.x() - (pivot.x() - self.min.x()) * factor,
                    pivot.y() - (pivot.y() - self.min.y()) * factor,
                ),
                max: Point2::new(
                    pivot.x() + (self.max.x() - pivot.x()) * factor,
                    pivot.y() + (self.max.y() - pivot.y()) * factor,
                ),
            }
        }
    }

    /// 按绕质心的极角 `atan2(y - ȳ, x - x̄)` 升序排列，得到逆时针顺序。
    pub fn sort_anticlockwise(points: &[Point2]) -> Vec<Point2> {
        if points.is_empty() {
            return Vec::new();
        }
        let count = points.len() as f64;
        let centroid = points.iter().map(|p| p.as_vec2()).sum::<DVec2>() / count;
        let mut keyed: Vec<(f64, Point2)> = points
            .iter()
            .map(|p| {
                let offset = p.as_vec2() - centroid;
                (offset.y.atan2(offset.x), *p)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        keyed.into_iter().map(|(_, point)| point).collect()
    }

    /// 精确相等去重，保留首次出现的顺序。
    pub fn dedup_exact(points: &[Point2]) -> Vec<Point2> {
        let mut unique: Vec<Point2> = Vec::with_capacity(points.len());
        for point in points {
            if !unique.contains(point) {
                unique.push(*point);
            }
        }
        unique
    }

}

pub mod document {
    use std::fmt;
    use std::str::FromStr;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::geometry::{BendLine, Bounds2D, Point2, Segment};

    /// 实体分类标签。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum ShapeKind {
        Line,
        Rectangle,
        Polyline,
    }

    impl ShapeKind {
        pub fn as_str(self) -> &'static str {
            match self {
                ShapeKind::Line => "LINE",
                ShapeKind::Rectangle => "RECTANGLE",
                ShapeKind::Polyline => "POLYLINE",
            }
        }
    }

    impl fmt::Display for ShapeKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for ShapeKind {
        type Err = ShapeError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_uppercase().as_str() {
                "LINE" => Ok(ShapeKind::Line),
                "RECTANGLE" => Ok(ShapeKind::Rectangle),
                "POLYLINE" => Ok(ShapeKind::Polyline),
                _ => Err(ShapeError::UnknownKind(s.trim().to_string())),
            }
        }
    }

    #[derive(Debug, Error, PartialEq)]
    pub enum ShapeError {
        #[error("{kind} requires {expected} points, got {actual}")]
        InvalidPointCount {
            kind: ShapeKind,
            expected: usize,
            actual: usize,
        },
        #[error("unknown shape kind: {0:?}")]
        UnknownKind(String),
    }

    /// 多段线实体：有序点列 + 闭合标记 + 分类。
    ///
    /// 点的插入顺序即绘制路径；闭合时不重复追加首点，闭合边由 [`Polyline::segments`] 合成。
    /// 包围盒只在构造时计算一次，修改点列后需调用 [`Polyline::recompute_bounds`]。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline {
        points: Vec<Point2>,
        is_closed: bool,
        kind: ShapeKind,
        bounds: Bounds2D,
    }

    impl Polyline {
        pub fn new(points: Vec<Point2>, kind: ShapeKind) -> Self {
            let bounds = Bounds2D::from_points(points.iter().copied());
            Self {
                points,
                is_closed: false,
                kind,
                bounds,
            }
        }

        pub fn line(start: Point2, end: Point2) -> Self {
            Self::new(vec![start, end], ShapeKind::Line)
        }

        /// 四个角点按调用方给定的顺序保存，不做排序或自交检查。
        pub fn rectangle(c1: Point2, c2: Point2, c3: Point2, c4: Point2) -> Self {
            Self::new(vec![c1, c2, c3, c4], ShapeKind::Rectangle)
        }

        pub fn polyline<I>(points: I) -> Self
        where
            I: IntoIterator<Item = Point2>,
        {
            Self::new(points.into_iter().collect(), ShapeKind::Polyline)
        }

        /// 按分类分派到对应工厂；点数不符时失败，不会构造出半成品。
        pub fn create_shape(kind: ShapeKind, points: Vec<Point2>) -> Result<Self, ShapeError> {
            let expected = match kind {
                ShapeKind::Line => Some(2),
                ShapeKind::Rectangle => Some(4),
                ShapeKind::Polyline => None,
            };
            if let Some(expected) = expected {
                if points.len() != expected {
                    return Err(ShapeError::InvalidPointCount {
                        kind,
                        expected,
                        actual: points.len(),
                    });
                }
            }
            Ok(match kind {
                ShapeKind::Line => Self::line(points[0], points[1]),
                ShapeKind::Rectangle => Self::rectangle(points[0], points[1], points[2], points[3]),
                ShapeKind::Polyline => Self::polyline(points),
            })
        }

        #[inline]
        pub fn points(&self) -> &[Point2] {
            &self.points
        }

        /// 直接修改点列。包围盒不会自动更新。
        #[inline]
        pub fn points_mut(&mut self) -> &mut Vec<Point2> {
            &mut self.points
        }

        #[inline]
        pub fn kind(&self) -> ShapeKind {
            self.kind
        }

        #[inline]
        pub fn is_closed(&self) -> bool {
            self.is_closed
        }

        #[inline]
        pub fn open(&mut self) {
            self.is_closed = false;
        }

        #[inline]
        pub fn close(&mut self) {
            self.is_closed = true;
        }

        #[inline]
        pub fn bounds(&self) -> Bounds2D {
            self.bounds
        }

        pub fn recompute_bounds(&mut self) {
            self.bounds = Bounds2D::from_points(self.points.iter().copied());
        }

        /// 依次返回各条边；闭合且至少三个点时补上末点到首点的闭合边。
        pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
            let closing = match (self.points.first(), self.points.last()) {
                (Some(first), Some(last)) if self.is_closed && self.points.len() > 2 => {
                    Some(Segment::new(*last, *first))
                }
                _ => None,
            };
            self.points
                .windows(2)
                .map(|pair| Segment::new(pair[0], pair[1]))
                .chain(closing)
        }
    }

    /// 编辑文档：持有全部多段线与折弯线。
    ///
    /// 不提供任何内部同步；并发访问需由调用方自行加锁。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        polylines: Vec<Polyline>,
        bend_lines: Vec<BendLine>,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        /// 追加多段线，返回其索引。
        pub fn add_polyline(&mut self, polyline: Polyline) -> usize {
            self.polylines.push(polyline);
            self.polylines.len() - 1
        }

        pub fn add_bend_line(&mut self, bend_line: BendLine) -> usize {
            self.bend_lines.push(bend_line);
            self.bend_lines.len() - 1
        }

        #[inline]
        pub fn polylines(&self) -> &[Polyline] {
            &self.polylines
        }

        #[inline]
        pub fn bend_lines(&self) -> &[BendLine] {
            &self.bend_lines
        }

        #[inline]
        pub fn polyline(&self, index: usize) -> Option<&Polyline> {
            self.polylines.get(index)
        }


        #[inline]
        pub fn last_polyline(&self) -> Option<&Polyline> {
            self.polylines.last()
        }


        pub fn remove_polyline(&mut self, index: usize) -> Option<Polyline> {
            if index < self.polylines.len() {
                Some(self.polylines.remove(index))
            } else {
                None
            }
        }

        #[inline]
        pub fn pop_polyline(&mut self) -> Option<Polyline> {
            self.polylines.pop()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.polylines.is_empty() && self.bend_lines.is_empty()
        }

        /// 同时清空多段线与折弯线。
        pub fn reset(&mut self) {
            self.polylines.clear();
            self.bend_lines.clear();
        }

        /// 所有多段线包围盒的并集。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let bounds = Bounds2D::union(self.polylines.iter().map(|p| &p.bounds));
            if bounds.is_empty() { None } else { Some(bounds) }
        }
    }

}
